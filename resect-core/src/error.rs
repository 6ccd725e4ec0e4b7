//! 错误类型.

use crate::GridSpace;

/// 本库所有阶段共用的错误类型.
#[derive(Debug, thiserror::Error)]
pub enum ResectError {
    /// 参数或数据不合法.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 半球参数不是 `L` 或 `R`.
    #[error("invalid hemisphere `{0}`, expected `L` or `R`")]
    InvalidHemisphere(String),

    /// 脑叶参数为空, 或包含 `T`/`F`/`O`/`P` 以外的字母.
    #[error("invalid lobes `{0}`, expected a non-empty combination of T, F, O, P")]
    InvalidLobes(String),

    /// 两个体数据不处于同一体素空间.
    #[error("grid space mismatch: expected {expected:?}, found {found:?}")]
    SpaceMismatch {
        /// 期望的体素空间.
        expected: Box<GridSpace>,
        /// 实际的体素空间.
        found: Box<GridSpace>,
    },

    /// 数组形状错误.
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// nifti 读写错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 文件读写错误.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 外部工具 (偏置场校正、配准等) 失败.
    #[error("collaborator `{stage}` failed: {message}")]
    Collaborator {
        /// 失败的阶段名.
        stage: &'static str,
        /// 外部工具给出的信息.
        message: String,
    },

    /// 区域生长在迭代上限内没有收敛.
    #[error("region growth did not converge after {iterations} iterations ({seed_voxels} voxels)")]
    NonConvergence {
        /// 已迭代次数.
        iterations: usize,
        /// 停止时种子体素个数.
        seed_voxels: usize,
    },

    /// 没有找到任何切除腔体.
    #[error("no resection cavity was found")]
    EmptyCavity,
}

/// 本库的 `Result` 别名.
pub type ResectResult<T> = Result<T, ResectError>;
