//! Drivers that pump a [`ProjectRuntime`] frame by frame.

use log::{debug, info};

use crate::error::Result;
use crate::project::{FrameReport, ProjectRuntime};

/// Runs a single frame.
pub fn once(runtime: &mut ProjectRuntime) -> Result<FrameReport> {
    runtime.update()
}

/// Runs frames until `frames` have run, the scene is empty, or `on_frame`
/// returns `false`. Returns the number of frames run.
pub fn looped<F>(runtime: &mut ProjectRuntime, frames: Option<u64>, mut on_frame: F) -> Result<u64>
where
    F: FnMut(&FrameReport) -> bool,
{
    let mut count = 0;
    while frames.is_none_or(|limit| count < limit) {
        let report = runtime.update()?;
        count += 1;
        if !on_frame(&report) {
            debug!("Frame loop stopped by caller after frame {}", report.frame);
            break;
        }
        if report.node_count == 0 {
            info!("Scene is empty, stopping after frame {}", report.frame);
            break;
        }
    }
    Ok(count)
}
