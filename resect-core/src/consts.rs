//! 通用常量. 脑区分割 (SynthSeg/FreeSurfer) 标签表.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// 一个语义脑区对应的一组分割标签. 标签按升序存储.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LabelSet(&'static [u16]);

impl LabelSet {
    /// 标签值是否属于该集合?
    #[inline]
    pub fn contains(&self, code: u16) -> bool {
        self.0.binary_search(&code).is_ok()
    }

    /// 获取全部标签值.
    #[inline]
    pub const fn codes(&self) -> &'static [u16] {
        self.0
    }

    /// 标签个数.
    #[inline]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// 是否为空集合?
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 脑外 CSF 区域的标签值. 它也是脑组织的外边界.
pub const OUTSIDE_BRAIN: u16 = 24;

/// 左侧额叶.
pub const LEFT_FRONTAL: LabelSet = LabelSet(&[
    1002, 1003, 1012, 1014, 1017, 1018, 1019, 1020, 1024, 1026, 1027, 1028, 1032,
]);

/// 左侧顶叶.
pub const LEFT_PARIETAL: LabelSet = LabelSet(&[1008, 1010, 1022, 1023, 1029, 1031]);

/// 左侧颞叶.
pub const LEFT_TEMPORAL: LabelSet =
    LabelSet(&[1001, 1006, 1007, 1009, 1015, 1016, 1030, 1033, 1034]);

/// 左侧枕叶.
pub const LEFT_OCCIPITAL: LabelSet = LabelSet(&[1005, 1011, 1013, 1021, 1025]);

/// 左侧岛叶.
pub const LEFT_INSULA: LabelSet = LabelSet(&[1035]);

/// 左侧皮层下结构.
pub const LEFT_SUBCORTICAL: LabelSet = LabelSet(&[10, 11, 12, 13, 17, 18, 26, 28]);

/// 右侧额叶.
pub const RIGHT_FRONTAL: LabelSet = LabelSet(&[
    2002, 2003, 2012, 2014, 2017, 2018, 2019, 2020, 2024, 2026, 2027, 2028, 2032,
]);

/// 右侧顶叶.
pub const RIGHT_PARIETAL: LabelSet = LabelSet(&[2008, 2010, 2022, 2023, 2029, 2031]);

/// 右侧颞叶.
pub const RIGHT_TEMPORAL: LabelSet =
    LabelSet(&[2001, 2006, 2007, 2009, 2015, 2016, 2030, 2033, 2034]);

/// 右侧枕叶.
pub const RIGHT_OCCIPITAL: LabelSet = LabelSet(&[2005, 2011, 2013, 2021, 2025]);

/// 右侧岛叶.
pub const RIGHT_INSULA: LabelSet = LabelSet(&[2035]);

/// 右侧皮层下结构.
pub const RIGHT_SUBCORTICAL: LabelSet = LabelSet(&[49, 50, 51, 52, 53, 54, 58, 60]);

/// 排除区 (脑室、小脑、脑干等), 永远不会被当作可切除组织.
pub const EXCLUDED: LabelSet = LabelSet(&[4, 7, 8, 14, 15, 16, 43, 46, 47]);

/// 侧脑室.
pub const VENTRICLES: LabelSet = LabelSet(&[4, 43]);

/// 脑区图谱中使用的区域标记值.
pub mod tag {
    /// 不属于任何区域 (脑外).
    pub const NONE: u8 = 0;

    /// 左侧额叶.
    pub const LEFT_FRONTAL: u8 = 11;

    /// 左侧顶叶.
    pub const LEFT_PARIETAL: u8 = 12;

    /// 左侧颞叶.
    pub const LEFT_TEMPORAL: u8 = 13;

    /// 左侧枕叶.
    pub const LEFT_OCCIPITAL: u8 = 14;

    /// 左侧岛叶.
    pub const LEFT_INSULA: u8 = 15;

    /// 左侧皮层下结构.
    pub const LEFT_SUBCORTICAL: u8 = 16;

    /// 右侧额叶.
    pub const RIGHT_FRONTAL: u8 = 21;

    /// 右侧顶叶.
    pub const RIGHT_PARIETAL: u8 = 22;

    /// 右侧颞叶.
    pub const RIGHT_TEMPORAL: u8 = 23;

    /// 右侧枕叶.
    pub const RIGHT_OCCIPITAL: u8 = 24;

    /// 右侧岛叶.
    pub const RIGHT_INSULA: u8 = 25;

    /// 右侧皮层下结构.
    pub const RIGHT_SUBCORTICAL: u8 = 26;

    /// 排除区.
    pub const EXCLUDED: u8 = 50;

    /// 标记值是否代表某个脑叶?
    #[inline]
    pub const fn is_lobe(t: u8) -> bool {
        matches!(t, 11..=16 | 21..=26)
    }
}

/// 脑叶区域表: `(区域标记值, 标签集合)`.
pub const LOBE_REGIONS: [(u8, LabelSet); 12] = [
    (tag::LEFT_FRONTAL, LEFT_FRONTAL),
    (tag::LEFT_PARIETAL, LEFT_PARIETAL),
    (tag::LEFT_TEMPORAL, LEFT_TEMPORAL),
    (tag::LEFT_OCCIPITAL, LEFT_OCCIPITAL),
    (tag::LEFT_INSULA, LEFT_INSULA),
    (tag::LEFT_SUBCORTICAL, LEFT_SUBCORTICAL),
    (tag::RIGHT_FRONTAL, RIGHT_FRONTAL),
    (tag::RIGHT_PARIETAL, RIGHT_PARIETAL),
    (tag::RIGHT_TEMPORAL, RIGHT_TEMPORAL),
    (tag::RIGHT_OCCIPITAL, RIGHT_OCCIPITAL),
    (tag::RIGHT_INSULA, RIGHT_INSULA),
    (tag::RIGHT_SUBCORTICAL, RIGHT_SUBCORTICAL),
];

/// 分割标签 -> 脑叶区域标记值. 排除区标签不在表中.
static LOBE_TAG_OF: Lazy<HashMap<u16, u8>> = Lazy::new(|| {
    LOBE_REGIONS
        .iter()
        .flat_map(|(t, set)| set.codes().iter().map(move |c| (*c, *t)))
        .collect()
});

/// 获取分割标签对应的脑叶区域标记值. 若不属于任何脑叶则返回 `None`.
#[inline]
pub fn lobe_tag_of(code: u16) -> Option<u8> {
    LOBE_TAG_OF.get(&code).copied()
}
