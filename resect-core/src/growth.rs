//! 有界区域生长.
//!
//! 从种子出发, 每轮膨胀一次并限制在允许区域内. 新增体素按连通域划分,
//! 体积过小的连通域被视为分割噪声, 永久加入禁区 (no-go), 之后不再考虑.
//! 当一轮新增体素数不超过阈值时停止.

use crate::morph::{dilate, label_components, Connectivity};
use crate::{GridSpace, Mask, ResectError, ResectResult};

/// 区域生长参数.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GrowthParams {
    /// 体素数少于该值的新增连通域加入禁区.
    pub min_fragment_voxels: usize,

    /// 一轮新增体素数不超过该值时停止.
    pub convergence_voxels: usize,

    /// 膨胀所用的邻接方式.
    pub dilation: Connectivity,

    /// 新增体素划分连通域所用的邻接方式.
    pub components: Connectivity,

    /// 迭代上限 = `ceil(iteration_cap_factor * 体数据对角线长度)`.
    pub iteration_cap_factor: f64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            min_fragment_voxels: 30,
            convergence_voxels: 100,
            dilation: Connectivity::Face6,
            components: Connectivity::Full26,
            iteration_cap_factor: 10.0,
        }
    }
}

impl GrowthParams {
    /// 在 `space` 上的迭代上限.
    #[inline]
    pub fn iteration_cap(&self, space: &GridSpace) -> usize {
        (self.iteration_cap_factor * space.diagonal()).ceil().max(1.0) as usize
    }
}

/// 观察每一轮生长结果. 用于调试与测试.
pub trait GrowthObserver {
    /// 第 `iteration` 轮 (从 1 开始) 结束时调用.
    fn on_iteration(&mut self, iteration: usize, seed: &Mask, no_go: &Mask);
}

/// 什么也不做的观察者.
impl GrowthObserver for () {
    #[inline]
    fn on_iteration(&mut self, _: usize, _: &Mask, _: &Mask) {}
}

/// 区域生长结果.
#[derive(Debug, Clone)]
pub struct GrowthOutcome {
    /// 收敛后的腔体掩膜 (base mask).
    pub base: Mask,

    /// 禁区.
    pub no_go: Mask,

    /// 迭代次数.
    pub iterations: usize,

    /// 最后一轮新增的体素数.
    pub last_delta: usize,
}

impl GrowthOutcome {
    /// 结果是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base.is_blank()
    }
}

/// 区域生长引擎.
#[derive(Debug, Clone, Default)]
pub struct GrowthEngine {
    params: GrowthParams,
}

impl GrowthEngine {
    /// 以给定参数创建.
    #[inline]
    pub const fn new(params: GrowthParams) -> Self {
        Self { params }
    }

    /// 获取参数.
    #[inline]
    pub const fn params(&self) -> &GrowthParams {
        &self.params
    }

    /// 在 `domain` 内从 `seed` 开始生长.
    ///
    /// # 返回值
    ///
    /// 空种子直接返回空结果 (0 轮). 超过迭代上限仍未收敛时返回
    /// [`ResectError::NonConvergence`].
    #[inline]
    pub fn grow(&self, seed: &Mask, domain: &Mask) -> ResectResult<GrowthOutcome> {
        self.grow_observed(seed, domain, &mut ())
    }

    /// 同 [`Self::grow`], 每轮结束时通知 `observer`.
    pub fn grow_observed<O: GrowthObserver + ?Sized>(
        &self,
        seed: &Mask,
        domain: &Mask,
        observer: &mut O,
    ) -> ResectResult<GrowthOutcome> {
        seed.ensure_same_space(domain)?;
        let p = &self.params;

        let mut seed = seed.binarized();
        let mut no_go = Mask::zeros(seed.space().clone());
        if seed.is_blank() {
            log::warn!("Region growth started from an empty seed");
            return Ok(GrowthOutcome {
                base: seed,
                no_go,
                iterations: 0,
                last_delta: 0,
            });
        }

        let cap = p.iteration_cap(seed.space());
        let mut count = seed.count();
        let mut iterations = 0;
        loop {
            if iterations >= cap {
                return Err(ResectError::NonConvergence {
                    iterations,
                    seed_voxels: count,
                });
            }
            iterations += 1;

            let dilated = dilate(&seed, p.dilation).intersect(domain)?;
            let expanded = dilated.subtract(&seed)?.subtract(&no_go)?;

            let comps = label_components(&expanded, p.components);
            let fragments = comps.mask_where(&expanded, |s| s < p.min_fragment_voxels);
            no_go.union_assign(&fragments)?;
            seed.union_assign(&expanded.subtract(&fragments)?)?;

            let next = seed.count();
            let delta = next - count;
            count = next;
            log::debug!(
                "Growth iteration {iterations}: {} new components, {} fragments frozen, +{delta} voxels",
                comps.len(),
                fragments.count()
            );
            observer.on_iteration(iterations, &seed, &no_go);

            if delta <= p.convergence_voxels {
                log::info!("Region growth converged after {iterations} iterations, {count} voxels");
                return Ok(GrowthOutcome {
                    base: seed,
                    no_go,
                    iterations,
                    last_delta: delta,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(n: usize, c: (f64, f64, f64), r: f64) -> Mask {
        Mask::from_fn(GridSpace::identity((n, n, n)), |(x, y, z)| {
            let d2 = (x as f64 - c.0).powi(2) + (y as f64 - c.1).powi(2) + (z as f64 - c.2).powi(2);
            (d2 <= r * r) as u8
        })
    }

    #[derive(Default)]
    struct Recorder {
        seeds: Vec<Mask>,
        no_gos: Vec<Mask>,
    }

    impl GrowthObserver for Recorder {
        fn on_iteration(&mut self, _: usize, seed: &Mask, no_go: &Mask) {
            self.seeds.push(seed.clone());
            self.no_gos.push(no_go.clone());
        }
    }

    #[test]
    fn test_empty_seed() {
        let domain = ball(10, (5.0, 5.0, 5.0), 4.0);
        let seed = Mask::zeros(domain.space().clone());
        let out = GrowthEngine::default().grow(&seed, &domain).unwrap();
        assert_eq!(out.iterations, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_grows_to_fill_domain() {
        let domain = ball(40, (20.0, 20.0, 20.0), 15.0);
        let seed = ball(40, (20.0, 20.0, 20.0), 2.0);
        // 菱形前沿到达球面附近时会分裂成小块, 这里关掉碎块冻结.
        let params = GrowthParams {
            convergence_voxels: 0,
            min_fragment_voxels: 0,
            ..Default::default()
        };
        let out = GrowthEngine::new(params).grow(&seed, &domain).unwrap();
        assert_eq!(out.base, domain);
        assert_eq!(out.last_delta, 0);
        assert!(out.no_go.is_blank());
    }

    /// 种子两侧的前沿都只有 1 个体素, 均被冻结, 生长立即停止.
    #[test]
    fn test_fragment_suppression() {
        let s = GridSpace::identity((20, 12, 12));
        let seed = Mask::from_fn(s.clone(), |(x, y, z)| (x == 2 && y == 5 && z == 5) as u8);
        // 右侧: 4x4x4 立方体. 左侧: x = 1 上的一条 5 体素的线.
        let domain = Mask::from_fn(s, |(x, y, z)| {
            let big = (3..=6).contains(&x) && (4..=7).contains(&y) && (4..=7).contains(&z);
            let small = x == 1 && y == 5 && (3..=7).contains(&z);
            let seed = x == 2 && y == 5 && z == 5;
            (big || small || seed) as u8
        });
        let params = GrowthParams {
            convergence_voxels: 0,
            min_fragment_voxels: 30,
            ..Default::default()
        };
        let mut rec = Recorder::default();
        let out = GrowthEngine::new(params)
            .grow_observed(&seed, &domain, &mut rec)
            .unwrap();

        assert_eq!(out.iterations, 1);
        assert_eq!(out.base, seed);
        assert!(out.no_go.is_set((1, 5, 5)));
        assert!(out.no_go.is_set((3, 5, 5)));
        assert_eq!(out.no_go.count(), 2);
        assert_eq!(rec.seeds.len(), 1);
    }

    #[test]
    fn test_large_region_admitted_small_frozen() {
        let s = GridSpace::identity((16, 16, 16));
        // 种子是一整面 (y, z) 平面, 向 +x 方向第一轮露出一整层 (>= 31 体素),
        // 向 -x 方向只有一个 5 体素的小块.
        let seed = Mask::from_fn(s.clone(), |(x, _, _)| (x == 5) as u8);
        let domain = Mask::from_fn(s, |(x, y, z)| {
            let plane = (5..=7).contains(&x);
            let small = x == 4 && y == 0 && z < 5;
            (plane || small) as u8
        });
        let params = GrowthParams {
            convergence_voxels: 0,
            ..Default::default()
        };
        let out = GrowthEngine::new(params).grow(&seed, &domain).unwrap();
        assert_eq!(out.base.count_where(|v| v != 0), 3 * 256);
        assert_eq!(out.no_go.count(), 5);
        assert!(out.no_go.is_set((4, 0, 0)));
    }

    #[test]
    fn test_no_go_is_monotonic() {
        let domain = Mask::from_fn(GridSpace::identity((24, 24, 24)), |(x, y, z)| {
            // 一个球 + 一些离散的小突起.
            let d2 = (x as f64 - 12.0).powi(2) + (y as f64 - 12.0).powi(2) + (z as f64 - 12.0).powi(2);
            (d2 <= 64.0 || (x + y + z) % 7 == 0) as u8
        });
        let seed = ball(24, (12.0, 12.0, 12.0), 3.0);
        let params = GrowthParams {
            convergence_voxels: 0,
            ..Default::default()
        };
        let mut rec = Recorder::default();
        GrowthEngine::new(params)
            .grow_observed(&seed, &domain, &mut rec)
            .unwrap();
        assert!(rec.no_gos.len() >= 2);
        for w in rec.no_gos.windows(2) {
            assert!(w[0].subtract(&w[1]).unwrap().is_blank());
        }
        for (s, n) in rec.seeds.iter().zip(rec.no_gos.iter()) {
            assert!(s.intersect(n).unwrap().is_blank());
            assert!(s.subtract(&domain.union(&seed).unwrap()).unwrap().is_blank());
        }
    }

    /// 伪随机的区域, 检查总能在上限内停止.
    #[test]
    fn test_terminates_on_pseudo_random_domains() {
        for (n, salt) in [(32, 0usize), (32, 1), (48, 2), (64, 3)] {
            let c = (n / 2) as f64;
            let domain = Mask::from_fn(GridSpace::identity((n, n, n)), |(x, y, z)| {
                let h = (x * 73856093) ^ (y * 19349663) ^ (z * 83492791) ^ (salt * 2654435761);
                (h % 5 != 0) as u8
            });
            let seed = ball(n, (c, c, c), 3.0).intersect(&domain).unwrap();
            let params = GrowthParams::default();
            let out = GrowthEngine::new(params).grow(&seed, &domain).unwrap();
            assert!(out.iterations <= params.iteration_cap(domain.space()));
            assert!(out.last_delta <= params.convergence_voxels);
        }
    }

    #[test]
    fn test_cap_reports_non_convergence() {
        let domain = Mask::filled(GridSpace::identity((30, 30, 30)), 1);
        let seed = ball(30, (15.0, 15.0, 15.0), 3.0);
        let params = GrowthParams {
            convergence_voxels: 0,
            iteration_cap_factor: 0.05,
            ..Default::default()
        };
        let err = GrowthEngine::new(params).grow(&seed, &domain).unwrap_err();
        assert!(matches!(err, ResectError::NonConvergence { iterations: 3, .. }));
    }
}
