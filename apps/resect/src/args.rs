//! 命令行参数.

use std::path::{Path, PathBuf};

use resect_core::atlas::Selection;
use resect_core::ResectError;

/// 用法说明.
pub const USAGE: &str = "\
usage: resect <pre_op.nii.gz> <post_op.nii.gz> <output_dir> <prefix> <L|R> <lobes>

    lobes: any combination of T, F, O, P (case-insensitive), e.g. `T` or `TF`";

/// 参数错误.
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    /// 参数个数不对.
    #[error("expected 6 arguments, found {0}")]
    Count(usize),

    /// 输入文件不存在.
    #[error("input file `{}` does not exist", .0.display())]
    Missing(PathBuf),

    /// 输入文件不是 `.nii.gz`.
    #[error("input file `{}` is not a `.nii.gz` image", .0.display())]
    NotNifti(PathBuf),

    /// 输出前缀为空或含路径分隔符.
    #[error("invalid output prefix `{0}`")]
    Prefix(String),

    /// 半球/脑叶参数不合法.
    #[error(transparent)]
    Selection(#[from] ResectError),
}

/// 解析后的参数.
#[derive(Debug, Clone)]
pub struct Args {
    pub pre: PathBuf,
    pub post: PathBuf,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub selection: Selection,
}

impl Args {
    /// 解析参数 (不含程序名). 在做任何处理之前检查全部参数.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, ArgsError> {
        let args: Vec<String> = args.into_iter().collect();
        let [pre, post, output_dir, prefix, hemisphere, lobes] = args.as_slice() else {
            return Err(ArgsError::Count(args.len()));
        };

        let pre = checked_input(pre)?;
        let post = checked_input(post)?;
        if prefix.is_empty() || prefix.contains(|c: char| c == '/' || c == '\\') {
            return Err(ArgsError::Prefix(prefix.clone()));
        }
        let selection = Selection::parse(hemisphere, lobes)?;

        Ok(Self {
            pre,
            post,
            output_dir: PathBuf::from(output_dir),
            prefix: prefix.clone(),
            selection,
        })
    }

    /// 术前图像文件名主干.
    #[inline]
    pub fn pre_stem(&self) -> &str {
        stem(&self.pre)
    }

    /// 术后图像文件名主干.
    #[inline]
    pub fn post_stem(&self) -> &str {
        stem(&self.post)
    }
}

fn checked_input(s: &str) -> Result<PathBuf, ArgsError> {
    let p = PathBuf::from(s);
    if !s.ends_with(".nii.gz") {
        return Err(ArgsError::NotNifti(p));
    }
    if !p.is_file() {
        return Err(ArgsError::Missing(p));
    }
    Ok(p)
}

/// 文件名中第一个 `.` 之前的部分. `sub-01.T1w.nii.gz` -> `sub-01`.
pub fn stem(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or_default()
}
