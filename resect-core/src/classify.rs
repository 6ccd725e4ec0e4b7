//! 自带的组织分类器: 以先验标签初始化的一维高斯混合模型 (EM).

use ordered_float::OrderedFloat;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
        use rayon::slice::ParallelSliceMut;
    }
}

use crate::external::TissueClassifier;
use crate::{LabelGrid, Mask, ResectError, ResectResult, ScalarGrid};

/// 方差下限, 防止某一类退化为单点.
const MIN_VARIANCE: f64 = 1e-6;

/// 以先验标签初始化的高斯混合分类器.
///
/// 每个体素的类先验为 `(1 - prior_weight) * 混合比例 + prior_weight * [先验标签 == k]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GaussianMixtureClassifier {
    /// 最大迭代次数.
    pub max_iterations: usize,

    /// 每体素平均对数似然的变化低于该值时停止.
    pub tolerance: f64,

    /// 先验标签的权重, 取值 `[0, 1]`.
    pub prior_weight: f64,
}

impl Default for GaussianMixtureClassifier {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 0.01,
            prior_weight: 0.25,
        }
    }
}

/// 一类的高斯参数.
#[derive(Debug, Clone, Copy)]
struct Gaussian {
    weight: f64,
    mean: f64,
    var: f64,
}

impl Gaussian {
    #[inline]
    fn log_pdf(&self, x: f64) -> f64 {
        let d = x - self.mean;
        -0.5 * (d * d / self.var + (2.0 * std::f64::consts::PI * self.var).ln())
    }

    /// 由带权样本估计.
    fn fit(samples: impl Iterator<Item = (f64, f64)>) -> Option<Self> {
        let (mut w, mut s, mut s2) = (0.0, 0.0, 0.0);
        for (x, r) in samples {
            w += r;
            s += r * x;
            s2 += r * x * x;
        }
        if w <= f64::EPSILON {
            return None;
        }
        let mean = s / w;
        let var = (s2 / w - mean * mean).max(MIN_VARIANCE);
        Some(Self {
            weight: w,
            mean,
            var,
        })
    }
}

impl GaussianMixtureClassifier {
    /// 初始化各类参数. 有先验体素的类用先验体素估计, 否则用强度分位数.
    fn init(&self, xs: &[f64], priors: &[u16], n: usize) -> Vec<Gaussian> {
        let mut sorted: Vec<f64> = xs.to_vec();
        sorted.sort_unstable_by_key(|v| OrderedFloat(*v));
        let total_var = Gaussian::fit(xs.iter().map(|x| (*x, 1.0)))
            .map_or(1.0, |g| g.var);

        (1..=n)
            .map(|k| {
                let fitted = Gaussian::fit(
                    xs.iter()
                        .zip(priors)
                        .filter(|(_, p)| **p as usize == k)
                        .map(|(x, _)| (*x, 1.0)),
                );
                let mut g = fitted.unwrap_or_else(|| {
                    let q = (k as f64 - 0.5) / n as f64;
                    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
                    Gaussian {
                        weight: 1.0,
                        mean: sorted[idx],
                        var: total_var / n as f64,
                    }
                });
                g.weight = 1.0 / n as f64;
                g
            })
            .collect()
    }

    /// 计算每个样本的后验 (写入 `resp`), 返回平均对数似然.
    fn e_step(&self, xs: &[f64], priors: &[u16], model: &[Gaussian], resp: &mut [f64]) -> f64 {
        let n = model.len();
        let w = self.prior_weight.clamp(0.0, 1.0);
        let row_ll = |(row, (&x, &p)): (&mut [f64], (&f64, &u16))| posterior(row, x, p, w, model);

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                let ll: f64 = resp
                    .par_chunks_mut(n)
                    .zip(xs.par_iter().zip(priors.par_iter()))
                    .map(row_ll)
                    .sum();
            } else {
                let ll: f64 = resp
                    .chunks_mut(n)
                    .zip(xs.iter().zip(priors))
                    .map(row_ll)
                    .sum();
            }
        }
        ll / xs.len() as f64
    }
}

/// 单个样本的后验, 写入 `row`. 返回该样本的对数似然.
fn posterior(row: &mut [f64], x: f64, p: u16, w: f64, model: &[Gaussian]) -> f64 {
    let mut max = f64::NEG_INFINITY;
    for (k, g) in model.iter().enumerate() {
        let hit = if p as usize == k + 1 { 1.0 } else { 0.0 };
        let pi = if p == 0 {
            g.weight
        } else {
            (1.0 - w) * g.weight + w * hit
        };
        row[k] = if pi > 0.0 {
            pi.ln() + g.log_pdf(x)
        } else {
            f64::NEG_INFINITY
        };
        max = max.max(row[k]);
    }
    let sum: f64 = row.iter().map(|v| (v - max).exp()).sum();
    row.iter_mut().for_each(|v| *v = (*v - max).exp() / sum);
    max + sum.ln()
}

impl TissueClassifier for GaussianMixtureClassifier {
    fn classify(
        &self,
        intensity: &ScalarGrid,
        prior: &LabelGrid,
        domain: &Mask,
        n_classes: usize,
    ) -> ResectResult<LabelGrid> {
        if n_classes == 0 || n_classes > u16::MAX as usize {
            return Err(ResectError::InvalidInput(format!(
                "cannot classify into {n_classes} classes"
            )));
        }
        intensity.ensure_same_space(prior)?;
        intensity.ensure_same_space(domain)?;

        let pos = domain.positions();
        let mut out = LabelGrid::zeros(intensity.space().clone());
        if pos.is_empty() {
            log::warn!("Classifier domain is empty, every voxel is left unlabeled");
            return Ok(out);
        }

        let xs: Vec<f64> = pos.iter().map(|p| intensity[*p] as f64).collect();
        let priors: Vec<u16> = pos.iter().map(|p| prior[*p]).collect();

        let mut model = self.init(&xs, &priors, n_classes);
        let mut resp = vec![0.0; xs.len() * n_classes];
        let mut last = f64::NEG_INFINITY;
        for it in 0..self.max_iterations {
            let ll = self.e_step(&xs, &priors, &model, &mut resp);
            if (ll - last).abs() < self.tolerance {
                log::debug!("EM converged after {it} iterations, mean log-likelihood {ll:.4}");
                break;
            }
            last = ll;

            let total = xs.len() as f64;
            for (k, g) in model.iter_mut().enumerate() {
                let samples = xs
                    .iter()
                    .enumerate()
                    .map(|(i, x)| (*x, resp[i * n_classes + k]));
                if let Some(mut fitted) = Gaussian::fit(samples) {
                    fitted.weight /= total;
                    *g = fitted;
                }
            }
        }
        self.e_step(&xs, &priors, &model, &mut resp);

        for (i, p) in pos.into_iter().enumerate() {
            let row = &resp[i * n_classes..(i + 1) * n_classes];
            let best = row
                .iter()
                .enumerate()
                .max_by_key(|(_, r)| OrderedFloat(**r))
                .map_or(0, |(k, _)| k);
            out[p] = best as u16 + 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridSpace;

    /// 左半边约 -1, 右半边约 +1, 加一点确定性的扰动.
    fn bimodal() -> (ScalarGrid, Mask) {
        let s = GridSpace::identity((10, 10, 10));
        let g = ScalarGrid::from_fn(s.clone(), |(x, y, z)| {
            let jitter = ((x * 7 + y * 13 + z * 29) % 11) as f32 / 50.0 - 0.1;
            if x < 5 {
                -1.0 + jitter
            } else {
                1.0 + jitter
            }
        });
        (g, Mask::filled(s, 1))
    }

    #[test]
    fn test_gmm_separates_bimodal() {
        let (g, domain) = bimodal();
        // 只给少量先验: 左下角为 2, 右上角为 1.
        let prior = LabelGrid::from_fn(g.space().clone(), |(x, y, z)| match (x, y, z) {
            (0, 0, 0) => 2,
            (9, 9, 9) => 1,
            _ => 0,
        });
        let out = GaussianMixtureClassifier::default()
            .classify(&g, &prior, &domain, 2)
            .unwrap();
        assert_eq!(out.count_where(|c| c == 2), 500);
        assert!(out[(1, 5, 5)] == 2 && out[(8, 5, 5)] == 1);
    }

    #[test]
    fn test_gmm_without_prior_and_outside_domain() {
        let (g, _) = bimodal();
        let domain = Mask::from_fn(g.space().clone(), |(_, y, _)| (y < 5) as u8);
        let prior = LabelGrid::zeros(g.space().clone());
        let out = GaussianMixtureClassifier::default()
            .classify(&g, &prior, &domain, 2)
            .unwrap();
        assert_eq!(out[(0, 9, 0)], 0);
        // 分位数初始化: 低强度为类 1.
        assert_eq!(out[(0, 0, 0)], 1);
        assert_eq!(out[(9, 0, 0)], 2);
        assert_eq!(out.count_where(|c| c != 0), 500);
    }

    #[test]
    fn test_gmm_rejects_zero_classes() {
        let (g, domain) = bimodal();
        let prior = LabelGrid::zeros(g.space().clone());
        assert!(GaussianMixtureClassifier::default()
            .classify(&g, &prior, &domain, 0)
            .is_err());
    }
}
