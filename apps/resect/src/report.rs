//! 运行结果.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use resect_core::atlas::Selection;
use resect_core::Idx3d;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 一次运行的摘要.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: PathBuf,
    pub selection: Selection,
    pub working_shape: Idx3d,
    pub native_shape: Idx3d,
    pub candidate_voxels: usize,
    pub growth_iterations: usize,
    pub frozen_voxels: usize,
    pub base_voxels: usize,
    pub cavity_voxels: usize,
    pub cavity_ml: f64,
    pub load_time: Duration,
    pub process_time: Duration,
    pub total_time: Duration,
}

impl RunReport {
    /// 将摘要写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        let lobes: String = self
            .selection
            .lobes
            .iter()
            .map(|l| format!("{l:?}"))
            .collect::<Vec<_>>()
            .join("+");

        writeln!(w, "Resection `{}`:", self.output.display())?;
        writeln!(w, "{S4}Selection: {} {lobes}", self.selection.hemisphere)?;
        writeln!(
            w,
            "{S4}Working grid: {:?}, native grid: {:?}",
            self.working_shape, self.native_shape
        )?;
        writeln!(w, "{S4}Candidate voxels: {}", self.candidate_voxels)?;
        writeln!(
            w,
            "{S4}Region growth: {} iterations, {} voxels, {} frozen",
            self.growth_iterations, self.base_voxels, self.frozen_voxels
        )?;
        writeln!(
            w,
            "{S4}Cavity: {} voxels ({:.2} ml)",
            self.cavity_voxels, self.cavity_ml
        )?;
        writeln!(w, "{S4}Loading time: {} ms", self.load_time.as_millis())?;
        writeln!(w, "{S4}Processing time: {} ms", self.process_time.as_millis())?;
        write!(w, "{S4}Total time: {} ms", self.total_time.as_millis())?;
        Ok(())
    }

    /// 打印摘要.
    pub fn print(&self) -> io::Result<()> {
        let mut buf = Vec::with_capacity(512);
        self.describe_into(&mut buf)?;
        sep();
        println!("{}", String::from_utf8_lossy(&buf));
        sep();
        Ok(())
    }
}
