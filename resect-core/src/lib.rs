#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 根据同一患者配准后的术前/术后 MRI 扫描, 提取手术切除腔体的 3D 二值掩膜.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 偏置场校正、颅骨剥离、脑区分割、非刚性配准这些外部工具只以 trait 的形式出现
//!   (见 [`external`]), 本库不负责实现它们.
//! 2. 所有参与比较/组合的体数据必须处于同一体素空间 (形状与仿射矩阵均一致),
//!   否则返回 [`ResectError::SpaceMismatch`], 而不是 panic.
//!
//! # 开发计划
//!
//! ### 体数据与 nifti 读写 ✅
//!
//! 体素按 nifti 原生的 `(x, y, z)` 顺序访问.
//!
//! 实现位于 `resect-core/src/data`.
//!
//! ### 三维形态学操作 & 连通域 ✅
//!
//! 6-邻域/26-邻域膨胀、腐蚀、闭运算, 连通域标记, 最大连通域.
//!
//! 实现位于 `resect-core/src/morph`.
//!
//! ### 精确欧氏距离变换 (含最近点索引) ✅
//!
//! 参考论文: "Distance Transforms of Sampled Functions" (Felzenszwalb & Huttenlocher).
//! 逐轴求下包络, 同时传递最近点坐标.
//!
//! 实现位于 `resect-core/src/morph/edt.rs`.
//!
//! ### 脑区图谱 ✅
//!
//! 脑区分割标签 -> 脑叶/排除区, 最近标签填充.
//!
//! 实现位于 `resect-core/src/atlas.rs`.
//!
//! ### 候选先验 & 两类组织分类 ✅
//!
//! 先在术后图像上分类一次定位术后腔体, 取其中较暗的一簇作为差值图分类的类 2 先验.
//!
//! 实现位于 `resect-core/src/{prior, classify}.rs`.
//!
//! ### 有界区域生长 & 边界体素吸纳 ✅
//!
//! 实现位于 `resect-core/src/{growth, admission}.rs`.
//!
//! ### 重采样回原始分辨率 ✅
//!
//! 实现位于 `resect-core/src/{resample, finalize}.rs`.
//!
//! ### 考虑体素各向异性的距离变换 ⌛️
//!
//! 目前距离以体素为单位.

/// 三维索引 `(x, y, z)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 压缩存储优化时会用到. 该结构不对外公开.
type Idx3dU16 = (u16, u16, u16);

/// 体数据基础结构与 nifti 读写.
mod data;

pub use data::{Affine, GridSpace, LabelGrid, Mask, ScalarGrid, VolumeGrid, Voxel};

pub mod admission;
pub mod atlas;
pub mod classify;
pub mod config;
pub mod consts;
mod error;
pub mod external;
pub mod finalize;
pub mod growth;
pub mod morph;
pub mod pipeline;
pub mod prelude;
pub mod prior;
pub mod resample;

pub use error::{ResectError, ResectResult};
