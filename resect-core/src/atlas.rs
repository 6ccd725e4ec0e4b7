//! 脑区图谱: 将脑区分割标签归并为 "半球 x 脑叶" 区域, 并用最近标签填充空隙.

use std::fmt;
use std::str::FromStr;

use crate::consts::{self, tag, EXCLUDED, OUTSIDE_BRAIN, VENTRICLES};
use crate::morph::distance_transform;
use crate::{LabelGrid, Mask, ResectError, ResectResult, VolumeGrid};

/// 大脑半球.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hemisphere {
    /// 左半球.
    Left,

    /// 右半球.
    Right,
}

impl Hemisphere {
    /// 区域标记值的十位数.
    #[inline]
    const fn tag_base(&self) -> u8 {
        match self {
            Self::Left => 10,
            Self::Right => 20,
        }
    }
}

impl FromStr for Hemisphere {
    type Err = ResectError;

    /// 大小写不敏感地解析 `L` / `R`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(Self::Left),
            "R" => Ok(Self::Right),
            _ => Err(ResectError::InvalidHemisphere(s.to_string())),
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "L",
            Self::Right => "R",
        })
    }
}

/// 脑叶 (含岛叶与皮层下结构).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lobe {
    /// 额叶.
    Frontal,
    /// 顶叶.
    Parietal,
    /// 颞叶.
    Temporal,
    /// 枕叶.
    Occipital,
    /// 岛叶.
    Insula,
    /// 皮层下结构.
    Subcortical,
}

impl Lobe {
    /// 全部脑叶.
    pub const ALL: [Lobe; 6] = [
        Lobe::Frontal,
        Lobe::Parietal,
        Lobe::Temporal,
        Lobe::Occipital,
        Lobe::Insula,
        Lobe::Subcortical,
    ];

    #[inline]
    const fn tag_offset(&self) -> u8 {
        match self {
            Self::Frontal => 1,
            Self::Parietal => 2,
            Self::Temporal => 3,
            Self::Occipital => 4,
            Self::Insula => 5,
            Self::Subcortical => 6,
        }
    }

    #[inline]
    const fn bit(&self) -> u8 {
        1 << (self.tag_offset() - 1)
    }

    /// 获取某一半球中该脑叶的区域标记值.
    #[inline]
    pub const fn tag(&self, hemisphere: Hemisphere) -> u8 {
        hemisphere.tag_base() + self.tag_offset()
    }
}

/// 一组被选中的脑叶.
///
/// 由字母 `T`, `F`, `O`, `P` 组合而成 (大小写不敏感, 允许重复).
/// 选择 `T` (颞叶) 时, 同时选中岛叶和皮层下结构.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LobeSelection(u8);

impl LobeSelection {
    /// 是否选中了 `lobe`?
    #[inline]
    pub const fn contains(&self, lobe: Lobe) -> bool {
        self.0 & lobe.bit() != 0
    }

    /// 是否什么也没选?
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// 依次迭代被选中的脑叶.
    pub fn iter(&self) -> impl Iterator<Item = Lobe> + '_ {
        Lobe::ALL.into_iter().filter(|l| self.contains(*l))
    }

    #[inline]
    fn insert(&mut self, lobe: Lobe) {
        self.0 |= lobe.bit();
    }
}

impl FromStr for LobeSelection {
    type Err = ResectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sel = Self::default();
        for c in s.trim().chars() {
            match c.to_ascii_uppercase() {
                'T' => {
                    sel.insert(Lobe::Temporal);
                    sel.insert(Lobe::Insula);
                    sel.insert(Lobe::Subcortical);
                }
                'F' => sel.insert(Lobe::Frontal),
                'O' => sel.insert(Lobe::Occipital),
                'P' => sel.insert(Lobe::Parietal),
                _ => return Err(ResectError::InvalidLobes(s.to_string())),
            }
        }
        if sel.is_empty() {
            return Err(ResectError::InvalidLobes(s.to_string()));
        }
        Ok(sel)
    }
}

/// 用户选择的切除区域: 半球 + 脑叶.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Selection {
    /// 切除所在半球.
    pub hemisphere: Hemisphere,

    /// 切除所在脑叶.
    pub lobes: LobeSelection,
}

impl Selection {
    /// 解析半球和脑叶参数.
    pub fn parse(hemisphere: &str, lobes: &str) -> ResectResult<Self> {
        Ok(Self {
            hemisphere: hemisphere.parse()?,
            lobes: lobes.parse()?,
        })
    }
}

/// 脑组织掩膜: 所有非零标签, 但不含脑外 CSF (`OUTSIDE_BRAIN`).
pub fn brain_mask(parcellation: &LabelGrid) -> Mask {
    parcellation.mask_where(|c| c != 0 && c != OUTSIDE_BRAIN)
}

/// 脑外 CSF 掩膜, 即脑组织的外边界.
pub fn outside_brain(parcellation: &LabelGrid) -> Mask {
    parcellation.mask_where(|c| c == OUTSIDE_BRAIN)
}

/// 侧脑室掩膜.
pub fn ventricles(parcellation: &LabelGrid) -> Mask {
    parcellation.mask_where(|c| VENTRICLES.contains(c))
}

/// 区域图谱. 每个脑组织体素都带有一个区域标记值 (见 [`consts::tag`]).
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAtlas {
    tags: VolumeGrid<u8>,
    excluded: Mask,
}

impl RegionAtlas {
    /// 构建区域图谱.
    ///
    /// 1. 按标签表把分割标签归并为区域标记;
    /// 2. 未被标记的体素取欧氏距离最近的已标记体素的标记;
    /// 3. 重新写入排除区;
    /// 4. 只保留 `brain` 范围内的体素.
    ///
    /// # 注意
    ///
    /// 若不存在排除区标签, 或不存在任何脑叶标签, 只打印警告, 不返回 `Err`.
    pub fn build(parcellation: &LabelGrid, brain: &Mask) -> ResectResult<Self> {
        parcellation.ensure_same_space(brain)?;

        let mut tags = parcellation.map(|c| consts::lobe_tag_of(c).unwrap_or(tag::NONE));
        let excluded = parcellation.mask_where(|c| EXCLUDED.contains(c));

        let seeds = tags.mask_where(|t| t != tag::NONE);
        if seeds.is_blank() {
            log::warn!("No lobe labels found in the parcellation, the atlas has no lobes");
        } else {
            let field = distance_transform(&seeds)?;
            let snapshot = tags.clone();
            tags.data_mut().indexed_iter_mut().for_each(|(pos, t)| {
                if *t == tag::NONE {
                    if let Some(n) = field.nearest(pos) {
                        *t = snapshot[n];
                    }
                }
            });
        }

        if excluded.is_blank() {
            log::warn!("No excluded labels found in the parcellation, nothing is excluded");
        }

        let tags = tags.zip_map(&excluded, |t, e| if e != 0 { tag::EXCLUDED } else { t })?;
        let tags = tags.zip_map(brain, |t, b| if b != 0 { t } else { tag::NONE })?;
        let excluded = excluded.intersect(brain)?;
        Ok(Self { tags, excluded })
    }

    /// 获取区域标记图.
    #[inline]
    pub fn tags(&self) -> &VolumeGrid<u8> {
        &self.tags
    }

    /// 排除区掩膜.
    #[inline]
    pub fn excluded(&self) -> &Mask {
        &self.excluded
    }

    /// 单个区域的掩膜.
    #[inline]
    pub fn region_mask(&self, hemisphere: Hemisphere, lobe: Lobe) -> Mask {
        let t = lobe.tag(hemisphere);
        self.tags.mask_where(|v| v == t)
    }

    /// 某一半球中被选中脑叶的并集.
    pub fn lobes_mask(&self, hemisphere: Hemisphere, lobes: &LobeSelection) -> Mask {
        let wanted: Vec<u8> = lobes.iter().map(|l| l.tag(hemisphere)).collect();
        self.tags.mask_where(|v| wanted.contains(&v))
    }

    /// 用户选中区域的掩膜.
    #[inline]
    pub fn selection_mask(&self, sel: &Selection) -> Mask {
        self.lobes_mask(sel.hemisphere, &sel.lobes)
    }

    /// 任一脑叶区域 (即脑组织中除排除区以外的部分).
    #[inline]
    pub fn lobe_tissue(&self) -> Mask {
        self.tags.mask_where(tag::is_lobe)
    }
}
