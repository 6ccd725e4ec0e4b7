//! 完整流程: 对齐后的术前/术后数据 -> 切除腔体掩膜.
//!
//! 每个阶段的结果都保存在 [`PipelineState`] 中, 阶段之间不经过磁盘.

use crate::admission::{admit, Admission};
use crate::atlas::{brain_mask, outside_brain, ventricles, RegionAtlas, Selection};
use crate::config::ResectConfig;
use crate::external::TissueClassifier;
use crate::growth::{GrowthEngine, GrowthObserver, GrowthOutcome};
use crate::morph::{dilate, erode, largest_component, Connectivity};
use crate::prior::{CandidatePrior, PostOpCavity, PriorInputs, PRIOR_CSF};
use crate::{LabelGrid, Mask, ResectError, ResectResult, ScalarGrid};

/// 处于同一术前工作空间的两期数据.
#[derive(Debug, Clone)]
pub struct AlignedScans {
    /// 术前强度图像 (已剥离颅骨).
    pub pre: ScalarGrid,
    /// 配准到术前空间的术后强度图像.
    pub post: ScalarGrid,
    /// 术前分割标签.
    pub pre_labels: LabelGrid,
    /// 映射到术前空间的术后分割标签.
    pub post_labels: LabelGrid,
}

impl AlignedScans {
    /// 检查四者处于同一体素空间.
    pub fn new(
        pre: ScalarGrid,
        post: ScalarGrid,
        pre_labels: LabelGrid,
        post_labels: LabelGrid,
    ) -> ResectResult<Self> {
        pre.ensure_same_space(&post)?;
        pre.ensure_same_space(&pre_labels)?;
        pre.ensure_same_space(&post_labels)?;
        Ok(Self {
            pre,
            post,
            pre_labels,
            post_labels,
        })
    }
}

/// 各阶段的中间结果.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// 术前脑组织.
    pub brain: Mask,
    /// 术前脑外 CSF.
    pub outside: Mask,
    /// 术前区域图谱.
    pub pre_atlas: RegionAtlas,
    /// 术后区域图谱.
    pub post_atlas: RegionAtlas,
    /// 术后腔体定位结果.
    pub postop: PostOpCavity,
    /// 候选先验.
    pub prior: CandidatePrior,
    /// 分类结果, 1 为组织, 2 为类 CSF.
    pub classes: LabelGrid,
    /// 候选腔体.
    pub candidate: Mask,
    /// 区域生长结果.
    pub growth: GrowthOutcome,
    /// 边界吸纳结果.
    pub admission: Admission,
}

impl PipelineState {
    /// 最终的腔体掩膜 (工作空间).
    #[inline]
    pub fn cavity(&self) -> &Mask {
        &self.admission.mask
    }
}

/// 切除腔体提取流程.
#[derive(Debug, Clone, Default)]
pub struct ResectionPipeline {
    config: ResectConfig,
}

impl ResectionPipeline {
    /// 以给定参数创建.
    #[inline]
    pub const fn new(config: ResectConfig) -> Self {
        Self { config }
    }

    /// 获取参数.
    #[inline]
    pub const fn config(&self) -> &ResectConfig {
        &self.config
    }

    /// 运行全部阶段.
    ///
    /// # 返回值
    ///
    /// 若最终没有任何腔体体素, 返回 [`ResectError::EmptyCavity`].
    #[inline]
    pub fn run(
        &self,
        scans: &AlignedScans,
        sel: &Selection,
        classifier: &dyn TissueClassifier,
    ) -> ResectResult<PipelineState> {
        self.run_observed(scans, sel, classifier, &mut ())
    }

    /// 同 [`Self::run`], 区域生长的每一轮都会通知 `observer`.
    pub fn run_observed(
        &self,
        scans: &AlignedScans,
        sel: &Selection,
        classifier: &dyn TissueClassifier,
        observer: &mut dyn GrowthObserver,
    ) -> ResectResult<PipelineState> {
        let brain = brain_mask(&scans.pre_labels);
        let outside = outside_brain(&scans.pre_labels);
        let pre_vents = ventricles(&scans.pre_labels);
        let post_vents = ventricles(&scans.post_labels);
        log::info!(
            "Selection {}/{:?}: {} brain voxels, {} outside-brain voxels",
            sel.hemisphere,
            sel.lobes.iter().collect::<Vec<_>>(),
            brain.count(),
            outside.count()
        );

        let post_brain = brain_mask(&scans.post_labels);
        let pre_atlas = RegionAtlas::build(&scans.pre_labels, &brain)?;
        let post_atlas = RegionAtlas::build(&scans.post_labels, &post_brain)?;

        let inputs = PriorInputs {
            pre: &scans.pre,
            post: &scans.post,
            post_atlas: &post_atlas,
            pre_ventricles: &pre_vents,
            post_ventricles: &post_vents,
            brain: &brain,
            post_brain: &post_brain,
        };
        let postop = PostOpCavity::locate(inputs, sel, classifier)?;
        let prior = CandidatePrior::build(inputs, sel, &postop.csf)?;

        let classes = classifier.classify(&prior.change, &prior.prior, &prior.domain, 2)?;
        classes.ensure_same_space(&brain)?;

        let candidate = classes
            .mask_where(|c| c == PRIOR_CSF)
            .intersect(&pre_atlas.selection_mask(sel))?
            .subtract(&dilate(&post_vents, Connectivity::Face6))?;
        let candidate = largest_component(&candidate, Connectivity::Full26);
        log::info!("Candidate cavity: {} voxels", candidate.count());

        let seed = erode(&candidate, Connectivity::Face6);
        let domain = candidate.intersect(&brain)?;
        let growth = GrowthEngine::new(self.config.growth).grow_observed(&seed, &domain, observer)?;
        if growth.is_empty() {
            return Err(ResectError::EmptyCavity);
        }

        let admission = admit(&growth.base, &brain, &outside, &self.config.admission)?;
        if admission.mask.is_blank() {
            return Err(ResectError::EmptyCavity);
        }

        Ok(PipelineState {
            brain,
            outside,
            pre_atlas,
            post_atlas,
            postop,
            prior,
            classes,
            candidate,
            growth,
            admission,
        })
    }
}
