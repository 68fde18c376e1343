use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use spexone::l1a::{assemble_l1a, AssemblyOptions};
use spexone::telemetry::TmtcIssue;
use tracing::{info, warn};

pub struct Args {
    pub tmtc_issue: u8,
    pub leap_seconds: i64,
    pub msm_id: Option<String>,
    pub orbit: i64,
    pub output: Option<PathBuf>,
    pub clobber: bool,
}

pub fn l1a(inputs: &[PathBuf], args: Args) -> Result<()> {
    for path in inputs {
        if !path.is_file() {
            bail!("{path:?} does not exist");
        }
    }

    let mut opts = AssemblyOptions::builder()
        .tmtc_issue(TmtcIssue(args.tmtc_issue))
        .leap_seconds(args.leap_seconds)
        .orbit_number(args.orbit)
        .clobber(args.clobber)
        .build();
    opts.output = args.output;
    opts.msm_id = args.msm_id;

    let Some(summary) = assemble_l1a(inputs, &opts).context("creating Level-1A product")?
    else {
        warn!("no product written");
        return Ok(());
    };

    info!(
        path = %summary.path.display(),
        images = summary.images,
        hk_packets = summary.hk_packets,
        skipped = summary.skipped,
        dropped = summary.dropped.dropped(),
        "wrote Level-1A product"
    );
    Ok(())
}
