//! 外部工具接口.
//!
//! 偏置场校正、颅骨剥离、脑区分割、配准与组织分类都由外部工具完成,
//! 本库只规定它们的输入输出. [`prepare`] 按顺序驱动这些工具,
//! 得到处于同一术前空间的 [`AlignedScans`].

use crate::atlas::brain_mask;
use crate::pipeline::AlignedScans;
use crate::prior::suppress_hyperintensities;
use crate::resample::{resample_linear, resample_nearest};
use crate::{GridSpace, LabelGrid, Mask, ResectResult, ScalarGrid};

/// 插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolation {
    /// 最近邻.
    Nearest,

    /// 多标签插值 (按标签分别平滑后取最大者), 用于分割标签.
    MultiLabel,

    /// 三线性.
    Linear,
}

/// 偏置场校正.
pub trait BiasFieldCorrector {
    /// 返回校正后的图像, 空间信息不变.
    fn correct(&self, image: &ScalarGrid) -> ResectResult<ScalarGrid>;
}

/// 颅骨剥离.
pub trait BrainExtractor {
    /// 返回剥离后的图像. `preserve_pial` 为 `true` 时保留软脑膜表面附近的组织.
    fn extract(&self, image: &ScalarGrid, preserve_pial: bool) -> ResectResult<ScalarGrid>;
}

/// 脑区分割.
pub trait Parcellator {
    /// 返回与 `image` 同空间的分割标签.
    fn parcellate(&self, image: &ScalarGrid) -> ResectResult<LabelGrid>;
}

/// 配准得到的空间变换.
pub trait Transform {
    /// 对强度图像施加变换, 结果处于固定图像空间.
    fn apply_scalar(&self, image: &ScalarGrid, interp: Interpolation) -> ResectResult<ScalarGrid>;

    /// 对分割标签施加变换 (多标签插值), 结果处于固定图像空间.
    fn apply_labels(&self, labels: &LabelGrid) -> ResectResult<LabelGrid>;
}

/// 配准结果.
pub struct Registered {
    /// 变换到固定图像空间的浮动图像.
    pub warped_moving: ScalarGrid,

    /// 逆变换到浮动图像空间的固定图像.
    pub warped_fixed: ScalarGrid,

    /// 浮动 -> 固定的正向变换.
    pub forward: Box<dyn Transform>,
}

/// 非刚性配准.
pub trait Registration {
    /// 将 `moving` 配准到 `fixed`.
    fn register(&self, fixed: &ScalarGrid, moving: &ScalarGrid) -> ResectResult<Registered>;
}

/// 两类 (或多类) 组织分类器.
pub trait TissueClassifier {
    /// 在 `domain` 内对 `intensity` 分类, 以 `prior` (0 为未知) 初始化.
    /// 返回值在 `domain` 外为 0, 在 `domain` 内取 `1..=n_classes`.
    fn classify(
        &self,
        intensity: &ScalarGrid,
        prior: &LabelGrid,
        domain: &Mask,
        n_classes: usize,
    ) -> ResectResult<LabelGrid>;
}

/// 预处理阶段用到的全部外部工具.
pub struct Collaborators<'a> {
    /// 偏置场校正.
    pub bias: &'a dyn BiasFieldCorrector,
    /// 颅骨剥离.
    pub extractor: &'a dyn BrainExtractor,
    /// 脑区分割.
    pub parcellator: &'a dyn Parcellator,
    /// 配准.
    pub registration: &'a dyn Registration,
}

/// 预处理参数.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// 工作空间. 为 `None` 时直接使用术前图像空间.
    pub working_space: Option<GridSpace>,

    /// 去除高亮噪点时的百分位数.
    pub hyper_percentile: f64,
}

/// 预处理: 校正、剥离、分割、配准, 得到处于术前工作空间的对齐数据.
///
/// 1. (可选) 将两期图像线性重采样到工作空间, 术后图像按术前图像的世界坐标重采样;
/// 2. 偏置场校正, 颅骨剥离 (保留软脑膜);
/// 3. 脑区分割, 并用分割得到的脑组织 + 脑外 CSF 再次剥离;
/// 4. 去除高亮噪点;
/// 5. 术后配准到术前, 分割标签按多标签插值映射.
pub fn prepare(
    tools: &Collaborators<'_>,
    pre_raw: &ScalarGrid,
    post_raw: &ScalarGrid,
    opts: &PrepareOptions,
) -> ResectResult<AlignedScans> {
    let (pre, post) = match &opts.working_space {
        Some(space) => (
            resample_linear(pre_raw, space)?,
            resample_linear(post_raw, space)?,
        ),
        None => (pre_raw.clone(), post_raw.clone()),
    };

    log::info!("Preparing pre-op scan");
    let (pre, pre_labels) = prepare_single(tools, &pre, opts.hyper_percentile)?;
    log::info!("Preparing post-op scan");
    let (post, post_labels) = prepare_single(tools, &post, opts.hyper_percentile)?;

    log::info!("Registering post-op scan to pre-op space");
    let reg = tools.registration.register(&pre, &post)?;
    let post_labels = reg.forward.apply_labels(&post_labels)?;
    let post_labels = if post_labels.space().same_as(pre.space()) {
        post_labels
    } else {
        resample_nearest(&post_labels, pre.space())?
    };

    AlignedScans::new(pre, reg.warped_moving, pre_labels, post_labels)
}

/// 单期图像的预处理: 校正、剥离、分割, 并去掉分割结果以外的部分.
fn prepare_single(
    tools: &Collaborators<'_>,
    raw: &ScalarGrid,
    hyper_percentile: f64,
) -> ResectResult<(ScalarGrid, LabelGrid)> {
    let corrected = tools.bias.correct(raw)?;
    let stripped = tools.extractor.extract(&corrected, true)?;
    let labels = tools.parcellator.parcellate(&stripped)?;
    stripped.ensure_same_space(&labels)?;

    // 脑组织 + 脑外 CSF.
    let head = brain_mask(&labels).union(&crate::atlas::outside_brain(&labels))?;
    let masked = stripped.zip_map(&head, |v, m| if m != 0 { v } else { 0.0 })?;
    Ok((suppress_hyperintensities(&masked, hyper_percentile), labels))
}
