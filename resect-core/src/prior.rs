//! 候选先验: 强度归一化、差值图, 以及交给两类组织分类器的先验标签.

use ordered_float::OrderedFloat;

use crate::atlas::{RegionAtlas, Selection};
use crate::external::TissueClassifier;
use crate::morph::{dilate, erode, largest_component, Connectivity};
use crate::{LabelGrid, Mask, ResectResult, ScalarGrid};

/// 先验标签: 非切除组织.
pub const PRIOR_TISSUE: u16 = 1;

/// 先验标签: 类 CSF (脑室 / 切除腔体).
pub const PRIOR_CSF: u16 = 2;

/// 对升序序列求第 `q` 百分位数 (线性插值). 序列为空时返回 `None`.
fn percentile_sorted(sorted: &[f32], q: f64) -> Option<f32> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some((sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac) as f32)
}

/// 去除高亮噪点: 在非零体素中, 不低于第 `percentile` 百分位数的值被替换为非零体素的中位数.
///
/// # 注意
///
/// 若不存在非零体素, 则原样返回并打印警告.
pub fn suppress_hyperintensities(grid: &ScalarGrid, percentile: f64) -> ScalarGrid {
    let mut values: Vec<f32> = grid
        .data()
        .iter()
        .copied()
        .filter(|v| *v != 0.0 && !v.is_nan())
        .collect();
    values.sort_unstable_by_key(|v| OrderedFloat(*v));

    let (Some(cut), Some(median)) = (
        percentile_sorted(&values, percentile),
        percentile_sorted(&values, 50.0),
    ) else {
        log::warn!("Image has no non-zero voxels, hyperintensity suppression skipped");
        return grid.clone();
    };

    grid.map(|v| if v != 0.0 && v >= cut { median } else { v })
}

/// 线性归一化到 `[0, 1]`: `(v - min) / (max - min)`.
///
/// # 注意
///
/// 若图像为常数 (或没有有效体素), 返回全 0 图像并打印警告.
pub fn rescale(grid: &ScalarGrid) -> ScalarGrid {
    match grid.min_max() {
        Some((lo, hi)) if hi > lo => {
            let ptp = hi - lo;
            grid.map(|v| (v - lo) / ptp)
        }
        _ => {
            log::warn!("Image is constant, rescaled to all zeros");
            grid.map(|_| 0.0)
        }
    }
}

/// 构造先验所需的输入. 全部处于术前体素空间.
#[derive(Debug, Clone, Copy)]
pub struct PriorInputs<'a> {
    /// 术前强度图像.
    pub pre: &'a ScalarGrid,
    /// 配准到术前空间的术后强度图像.
    pub post: &'a ScalarGrid,
    /// 术后区域图谱 (已映射到术前空间).
    pub post_atlas: &'a RegionAtlas,
    /// 术前脑室.
    pub pre_ventricles: &'a Mask,
    /// 术后脑室 (已映射到术前空间).
    pub post_ventricles: &'a Mask,
    /// 术前脑组织掩膜.
    pub brain: &'a Mask,
    /// 术后脑组织掩膜 (已映射到术前空间).
    pub post_brain: &'a Mask,
}

/// `tissue` 记为 1, `csf` 记为 2, 两者重叠时取 2.
fn two_class_prior(tissue: &Mask, csf: &Mask) -> ResectResult<LabelGrid> {
    tissue.zip_map(csf, |t, c| match (t != 0, c != 0) {
        (_, true) => PRIOR_CSF,
        (true, false) => PRIOR_TISSUE,
        _ => 0,
    })
}

/// 一维 2-means. 返回每个样本是否属于高强度一簇; 所有样本相同时都归入低强度簇.
fn two_means(xs: &[f32]) -> Vec<bool> {
    let (Some(lo), Some(hi)) = (
        xs.iter().copied().min_by_key(|v| OrderedFloat(*v)),
        xs.iter().copied().max_by_key(|v| OrderedFloat(*v)),
    ) else {
        return Vec::new();
    };
    let (mut lo, mut hi) = (lo as f64, hi as f64);
    let mut high = vec![false; xs.len()];
    for _ in 0..50 {
        let mut changed = false;
        for (h, &x) in high.iter_mut().zip(xs) {
            let x = x as f64;
            let is_high = (x - hi).abs() < (x - lo).abs();
            changed |= is_high != *h;
            *h = is_high;
        }
        let mean = |want: bool| {
            let (s, n) = xs
                .iter()
                .zip(&high)
                .filter(|(_, h)| **h == want)
                .fold((0.0, 0usize), |(s, n), (x, _)| (s + *x as f64, n + 1));
            (n > 0).then(|| s / n as f64)
        };
        lo = mean(false).unwrap_or(lo);
        hi = mean(true).unwrap_or(hi);
        if !changed {
            break;
        }
    }
    high
}

/// `region` 内按强度分为两簇, 返回中位数较低的一簇.
fn darker_cluster(image: &ScalarGrid, region: &Mask) -> Mask {
    let pos = region.positions();
    let xs: Vec<f32> = pos.iter().map(|p| image[*p]).collect();
    let high = two_means(&xs);

    let median = |want: bool| {
        let mut v: Vec<f32> = xs
            .iter()
            .zip(&high)
            .filter(|(_, h)| **h == want)
            .map(|(x, _)| *x)
            .collect();
        v.sort_unstable_by_key(|x| OrderedFloat(*x));
        percentile_sorted(&v, 50.0)
    };
    let pick_high = match (median(false), median(true)) {
        (Some(l), Some(h)) => h < l,
        (None, Some(_)) => true,
        _ => false,
    };

    let mut out = Mask::zeros(region.space().clone());
    for (p, h) in pos.into_iter().zip(high) {
        if h == pick_high {
            out[p] = 1;
        }
    }
    out
}

/// 术后腔体定位: 在术后图像上先做一次两类分类, 得到术后腔体及其中的 CSF.
///
/// 这里得到的 CSF 作为差值图分类时类 2 的先验.
#[derive(Debug, Clone)]
pub struct PostOpCavity {
    /// 术后分类的先验: 1 为术后非切除组织 (去掉脑室), 2 为腐蚀一次的术后脑室.
    pub prior: LabelGrid,
    /// 术后分类结果.
    pub classes: LabelGrid,
    /// 术后腔体: 类 2 ∧ 术后被选中的脑叶, 取最大连通域后去掉膨胀一次的脑室.
    pub cavity: Mask,
    /// 腔体中强度中位数较低的一簇.
    pub csf: Mask,
}

impl PostOpCavity {
    fn skipped(input: &PriorInputs<'_>) -> Self {
        let space = input.post.space().clone();
        Self {
            prior: LabelGrid::zeros(space.clone()),
            classes: LabelGrid::zeros(space.clone()),
            cavity: Mask::zeros(space.clone()),
            csf: Mask::zeros(space),
        }
    }

    /// 定位术后腔体.
    ///
    /// # 注意
    ///
    /// 腐蚀后的术后脑室为空时类 2 没有任何先验, 此时跳过这一步,
    /// 打印警告并返回全空的结果.
    pub fn locate(
        input: PriorInputs<'_>,
        sel: &Selection,
        classifier: &dyn TissueClassifier,
    ) -> ResectResult<Self> {
        input.post.ensure_same_space(input.post_brain)?;
        input.post.ensure_same_space(input.post_ventricles)?;
        input.post.ensure_same_space(input.post_atlas.tags())?;

        let csf_prior = erode(input.post_ventricles, Connectivity::Face6);
        if csf_prior.is_blank() {
            log::warn!("No post-op ventricles to seed the csf class, post-op cavity localisation skipped");
            return Ok(Self::skipped(&input));
        }

        let post = rescale(input.post);
        let resected = input
            .post_atlas
            .selection_mask(sel)
            .intersect(input.post_brain)?;
        let tissue = input
            .post_brain
            .subtract(&resected)?
            .subtract(input.post_ventricles)?;
        let prior = two_class_prior(&tissue, &csf_prior)?;
        let domain = erode(input.post_brain, Connectivity::Face6);

        let classes = classifier.classify(&post, &prior, &domain, 2)?;
        classes.ensure_same_space(&post)?;

        let cavity = classes.mask_where(|c| c == PRIOR_CSF).intersect(&resected)?;
        let cavity = largest_component(&cavity, Connectivity::Full26)
            .subtract(&dilate(input.post_ventricles, Connectivity::Face6))?;
        let csf = darker_cluster(&post, &cavity);
        log::info!(
            "Post-op cavity: {} voxels, {} csf voxels",
            cavity.count(),
            csf.count()
        );

        Ok(Self {
            prior,
            classes,
            cavity,
            csf,
        })
    }
}

/// 候选先验.
#[derive(Debug, Clone)]
pub struct CandidatePrior {
    /// 差值图: 归一化术后 - 归一化术前.
    pub change: ScalarGrid,
    /// 先验标签: 0 未知, 1 非切除组织, 2 类 CSF.
    pub prior: LabelGrid,
    /// 分类器工作区域: 腐蚀一次的脑组织.
    pub domain: Mask,
    /// 术后图谱中被选中的脑叶.
    pub resected: Mask,
    /// 脑组织中其余部分.
    pub non_resected: Mask,
}

impl CandidatePrior {
    /// 构造候选先验.
    ///
    /// 非切除组织 (去掉膨胀一次的两期脑室并集) 记为 1;
    /// 术后腔体中的 CSF (见 [`PostOpCavity`]) 记为 2, 两者重叠时取 2.
    /// `post_csf` 为空时改用腐蚀一次的术后脑室.
    pub fn build(input: PriorInputs<'_>, sel: &Selection, post_csf: &Mask) -> ResectResult<Self> {
        input.pre.ensure_same_space(input.post)?;
        input.pre.ensure_same_space(input.brain)?;
        input.brain.ensure_same_space(input.post_atlas.tags())?;

        let change = rescale(input.post).zip_map(&rescale(input.pre), |a, b| a - b)?;

        let resected = input.post_atlas.selection_mask(sel).intersect(input.brain)?;
        let non_resected = input.brain.subtract(&resected)?;

        let vents = input.pre_ventricles.union(input.post_ventricles)?;
        let vents = dilate(&vents, Connectivity::Face6);
        let tissue = non_resected.subtract(&vents)?;
        input.pre.ensure_same_space(post_csf)?;
        let prior = if post_csf.is_blank() {
            log::warn!("No post-op csf, eroded post-op ventricles used as the csf prior");
            two_class_prior(&tissue, &erode(input.post_ventricles, Connectivity::Face6))?
        } else {
            two_class_prior(&tissue, post_csf)?
        };

        let domain = erode(input.brain, Connectivity::Face6);
        log::info!(
            "Prior built: {} tissue voxels, {} csf voxels, {} domain voxels",
            prior.count_where(|p| p == PRIOR_TISSUE),
            prior.count_where(|p| p == PRIOR_CSF),
            domain.count()
        );

        Ok(Self {
            change,
            prior,
            domain,
            resected,
            non_resected,
        })
    }
}
