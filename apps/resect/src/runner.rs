//! 程序运行函数.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use resect_core::finalize::finalize;
use resect_core::pipeline::{AlignedScans, PipelineState, ResectionPipeline};
use resect_core::prior::suppress_hyperintensities;
use resect_core::{GridSpace, LabelGrid, ScalarGrid, VolumeGrid, Voxel};

use crate::args::Args;
use crate::config::AppConfig;
use crate::report::RunReport;

/// 外部工具输出的四个文件.
#[derive(Debug, Clone)]
pub struct PreparedFiles {
    pub pre_brain: PathBuf,
    pub pre_labels: PathBuf,
    pub post_warped: PathBuf,
    pub post_labels: PathBuf,
}

impl PreparedFiles {
    /// 按命名约定定位 `dir` 下的文件.
    pub fn locate(dir: &Path, pre_stem: &str, post_stem: &str) -> Self {
        Self {
            pre_brain: dir.join(format!("{pre_stem}_brain.nii.gz")),
            pre_labels: dir.join(format!("{pre_stem}_parcellation.nii.gz")),
            post_warped: dir.join(format!("{post_stem}_warped.nii.gz")),
            post_labels: dir.join(format!("{post_stem}_parcellation_warped.nii.gz")),
        }
    }

    /// 检查所有文件都存在.
    pub fn check(&self) -> anyhow::Result<()> {
        for p in [
            &self.pre_brain,
            &self.pre_labels,
            &self.post_warped,
            &self.post_labels,
        ] {
            anyhow::ensure!(p.is_file(), "prepared file `{}` not found", p.display());
        }
        Ok(())
    }
}

fn open<T: Voxel>(path: &Path) -> anyhow::Result<VolumeGrid<T>> {
    VolumeGrid::open(path).with_context(|| format!("reading {}", path.display()))
}

/// 读取外部工具输出并对齐到术前工作空间.
pub fn load_scans(files: &PreparedFiles, hyper_percentile: f64) -> anyhow::Result<AlignedScans> {
    let pre: ScalarGrid = open(&files.pre_brain)?;
    let post: ScalarGrid = open(&files.post_warped)?;
    let pre_labels: LabelGrid = open(&files.pre_labels)?;
    let post_labels: LabelGrid = open(&files.post_labels)?;
    let scans = AlignedScans::new(
        suppress_hyperintensities(&pre, hyper_percentile),
        suppress_hyperintensities(&post, hyper_percentile),
        pre_labels,
        post_labels,
    )?;
    Ok(scans)
}

/// 保存工作空间中的中间结果.
fn save_intermediates(dir: &Path, prefix: &str, state: &PipelineState) -> anyhow::Result<()> {
    let path = |name: &str| dir.join(format!("{prefix}_{name}.nii.gz"));
    state.postop.cavity.save(path("postop_cavity"))?;
    state.postop.csf.save(path("postop_csf"))?;
    state.prior.change.save(path("change"))?;
    state.prior.prior.save(path("prior"))?;
    state.classes.save(path("classes"))?;
    state.candidate.save(path("candidate"))?;
    state.growth.base.save(path("base"))?;
    state.growth.no_go.save(path("no_go"))?;
    state.admission.boundary.save(path("boundary"))?;
    state.cavity().save(path("cavity_working"))?;
    state.pre_atlas.tags().save(path("atlas"))?;
    Ok(())
}

/// 实际运行.
pub fn run(args: &Args, cfg: &AppConfig) -> anyhow::Result<RunReport> {
    let start = Instant::now();
    let prepared = cfg.prepared_dir_for(&args.output_dir);
    let files = PreparedFiles::locate(&prepared, args.pre_stem(), args.post_stem());
    files.check()?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    log::info!("Loading prepared scans from {}", prepared.display());
    let scans = load_scans(&files, cfg.core.hyper_percentile)?;
    let native: GridSpace = open::<f32>(&args.pre)?.space().clone();
    let loaded = start.elapsed();

    let pipeline = ResectionPipeline::new(cfg.core);
    let state = pipeline.run(&scans, &args.selection, &cfg.core.classifier)?;
    let processed = start.elapsed();

    let mask = finalize(state.cavity(), &native)?;
    let output = args
        .output_dir
        .join(format!("{}_resection_mask.nii.gz", args.prefix));
    mask.save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("Cavity mask written to {}", output.display());

    if cfg.save_intermediates {
        save_intermediates(&args.output_dir, &args.prefix, &state)?;
    }

    Ok(RunReport {
        output,
        selection: args.selection,
        working_shape: scans.pre.shape(),
        native_shape: native.shape(),
        candidate_voxels: state.candidate.count(),
        growth_iterations: state.growth.iterations,
        frozen_voxels: state.growth.no_go.count(),
        base_voxels: state.growth.base.count(),
        cavity_voxels: mask.count(),
        cavity_ml: mask.count() as f64 * native.spacing().iter().product::<f64>() / 1000.0,
        load_time: loaded,
        process_time: processed - loaded,
        total_time: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use resect_core::Mask;

    /// 32^3 的合成病例: 半径 12 的脑组织 (x < 20 为左颞叶), 外包脑外 CSF,
    /// 术后在左颞叶中挖掉半径 6 的球.
    fn write_case(raw_dir: &Path, prep: &Path) -> (PathBuf, PathBuf) {
        let space = GridSpace::with_spacing((32, 32, 32), [2.0, 2.0, 2.0]);
        let d2 = |(x, y, z): (usize, usize, usize), c: (f64, f64, f64)| {
            (x as f64 - c.0).powi(2) + (y as f64 - c.1).powi(2) + (z as f64 - c.2).powi(2)
        };
        let labels = LabelGrid::from_fn(space.clone(), |p| match d2(p, (16.0, 16.0, 16.0)) {
            r if r <= 144.0 && p.0 < 20 => 1015,
            r if r <= 144.0 => 1002,
            r if r <= 196.0 => 24,
            _ => 0,
        });
        let cavity = Mask::from_fn(space, |p| (d2(p, (12.0, 16.0, 16.0)) <= 36.0) as u8);
        let pre = labels.map(|c| match c {
            0 => 0.0,
            24 => 0.2,
            _ => 1.0f32,
        });
        let post = pre.zip_map(&cavity, |v, c| if c != 0 { 0.2 } else { v }).unwrap();

        fs::create_dir_all(prep).unwrap();
        let (pre_raw, post_raw) = (raw_dir.join("case_pre.nii.gz"), raw_dir.join("case_post.nii.gz"));
        pre.save(&pre_raw).unwrap();
        post.save(&post_raw).unwrap();
        let files = PreparedFiles::locate(prep, "case_pre", "case_post");
        pre.save(&files.pre_brain).unwrap();
        labels.save(&files.pre_labels).unwrap();
        post.save(&files.post_warped).unwrap();
        labels.save(&files.post_labels).unwrap();
        (pre_raw, post_raw)
    }

    #[test]
    fn test_run_on_synthetic_case() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (pre, post) = write_case(dir.path(), &out.join("prepared"));

        let args = Args::parse(
            [
                pre.to_str().unwrap(),
                post.to_str().unwrap(),
                out.to_str().unwrap(),
                "case",
                "L",
                "T",
            ]
            .map(String::from),
        )
        .unwrap();
        let cfg = AppConfig {
            save_intermediates: true,
            ..Default::default()
        };
        let report = run(&args, &cfg).unwrap();

        assert_eq!(report.output, out.join("case_resection_mask.nii.gz"));
        assert!(out.join("case_base.nii.gz").is_file());
        assert!(out.join("case_postop_csf.nii.gz").is_file());
        let mask = Mask::open(&report.output).unwrap();
        assert_eq!(mask.shape(), (32, 32, 32));
        assert_eq!(mask.space().spacing(), [2.0, 2.0, 2.0]);
        // 半径 6 的球约 925 个体素.
        assert!((740..=1110).contains(&report.cavity_voxels));
        assert_eq!(mask.count(), report.cavity_voxels);
        assert!((report.cavity_ml - report.cavity_voxels as f64 * 0.008).abs() < 1e-9);
    }

    #[test]
    fn test_prepared_file_names() {
        let f = PreparedFiles::locate(Path::new("prep"), "sub01_pre", "sub01_post");
        assert_eq!(f.pre_brain, Path::new("prep/sub01_pre_brain.nii.gz"));
        assert_eq!(f.pre_labels, Path::new("prep/sub01_pre_parcellation.nii.gz"));
        assert_eq!(f.post_warped, Path::new("prep/sub01_post_warped.nii.gz"));
        assert_eq!(
            f.post_labels,
            Path::new("prep/sub01_post_parcellation_warped.nii.gz")
        );
        assert!(f.check().is_err());
    }
}
