//! 可调参数.

use crate::admission::AdmissionParams;
use crate::classify::GaussianMixtureClassifier;
use crate::growth::GrowthParams;

/// 全部可调参数. 缺省值即推荐值.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResectConfig {
    /// 区域生长.
    pub growth: GrowthParams,

    /// 边界吸纳.
    pub admission: AdmissionParams,

    /// 去除高亮噪点时的百分位数.
    pub hyper_percentile: f64,

    /// 自带分类器.
    pub classifier: GaussianMixtureClassifier,
}

impl Default for ResectConfig {
    fn default() -> Self {
        Self {
            growth: GrowthParams::default(),
            admission: AdmissionParams::default(),
            hyper_percentile: 99.0,
            classifier: GaussianMixtureClassifier::default(),
        }
    }
}
