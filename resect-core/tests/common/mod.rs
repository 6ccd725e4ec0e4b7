//! 集成测试共用的合成数据.

#![allow(dead_code)]

use resect_core::external::TissueClassifier;
use resect_core::pipeline::AlignedScans;
use resect_core::{GridSpace, Idx3d, LabelGrid, Mask, ResectResult, ScalarGrid};

/// 合成体数据边长.
pub const N: usize = 32;

/// 脑组织球心.
pub const BRAIN_CENTER: [f64; 3] = [16.0, 16.0, 16.0];

/// 脑组织半径.
pub const BRAIN_RADIUS: f64 = 12.0;

/// 脑外 CSF 外半径.
pub const SHELL_RADIUS: f64 = 14.0;

/// 腔体中心, 位于左颞叶.
pub const CAVITY_CENTER: [f64; 3] = [12.0, 16.0, 16.0];

/// 腔体半径.
pub const CAVITY_RADIUS: f64 = 6.0;

/// 贴着脑表面的腔体中心, 同样位于左颞叶.
pub const SURFACE_CAVITY_CENTER: [f64; 3] = [8.0, 16.0, 16.0];

/// 贴着脑表面的腔体半径.
pub const SURFACE_CAVITY_RADIUS: f64 = 5.0;

/// 脑室中心, 位于左额叶.
pub const VENTRICLE_CENTER: [f64; 3] = [22.0, 16.0, 16.0];

/// 脑室半径.
pub const VENTRICLE_RADIUS: f64 = 2.5;

/// 只打印警告以上的日志. 重复初始化的错误直接忽略.
pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
}

fn dist2((x, y, z): Idx3d, c: [f64; 3]) -> f64 {
    (x as f64 - c[0]).powi(2) + (y as f64 - c[1]).powi(2) + (z as f64 - c[2]).powi(2)
}

pub fn space() -> GridSpace {
    GridSpace::identity((N, N, N))
}

/// 球形掩膜.
pub fn ball(center: [f64; 3], radius: f64) -> Mask {
    Mask::from_fn(space(), |p| (dist2(p, center) <= radius * radius) as u8)
}

/// 分割标签: 球内 `x < 20` 为左颞叶 (1015), 其余为左额叶 (1002),
/// 外面包一层脑外 CSF (24).
pub fn parcellation() -> LabelGrid {
    LabelGrid::from_fn(space(), |p| {
        let d2 = dist2(p, BRAIN_CENTER);
        if d2 <= BRAIN_RADIUS * BRAIN_RADIUS {
            if p.0 < 20 {
                1015
            } else {
                1002
            }
        } else if d2 <= SHELL_RADIUS * SHELL_RADIUS {
            24
        } else {
            0
        }
    })
}

/// 在 [`parcellation`] 的基础上加一个侧脑室 (4).
pub fn parcellation_with_ventricle() -> LabelGrid {
    let vent = ball(VENTRICLE_CENTER, VENTRICLE_RADIUS);
    let mut labels = parcellation();
    for p in vent.positions() {
        labels[p] = 4;
    }
    labels
}

/// 强度图像: 脑组织 1.0, 脑外 CSF 与脑室 0.2; 若给出 `cavity`, 腔体内也为 0.2.
pub fn intensity(labels: &LabelGrid, cavity: Option<&Mask>) -> ScalarGrid {
    ScalarGrid::from_fn(space(), |p| {
        if cavity.is_some_and(|c| c.is_set(p)) {
            return 0.2;
        }
        match labels[p] {
            0 => 0.0,
            4 | 43 | 24 => 0.2,
            _ => 1.0,
        }
    })
}

/// 术前/术后共用 `labels`, 术后在 `cavity` 处变暗.
pub fn scans_with(labels: LabelGrid, cavity: &Mask) -> AlignedScans {
    let pre = intensity(&labels, None);
    let post = intensity(&labels, Some(cavity));
    AlignedScans::new(pre, post, labels.clone(), labels).unwrap()
}

/// 一对已对齐的合成扫描. 术后在左颞叶中挖掉一个球形腔体.
pub fn synthetic_scans() -> AlignedScans {
    scans_with(parcellation(), &ball(CAVITY_CENTER, CAVITY_RADIUS))
}

/// 按差值阈值分类: 差值明显变暗的体素为类 2.
pub struct ThresholdClassifier {
    pub threshold: f32,
}

impl TissueClassifier for ThresholdClassifier {
    fn classify(
        &self,
        intensity: &ScalarGrid,
        _prior: &LabelGrid,
        domain: &Mask,
        _n_classes: usize,
    ) -> ResectResult<LabelGrid> {
        intensity.zip_map(domain, |v, d| match (d != 0, v < self.threshold) {
            (false, _) => 0,
            (true, true) => 2,
            (true, false) => 1,
        })
    }
}
