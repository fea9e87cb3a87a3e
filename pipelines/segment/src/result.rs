//! 批处理结果汇总.

use lung_berry::dataset::{BatchReport, Outcome};
use std::io::{self, Write};
use std::time::Duration;

/// 将 `report` 的结果写进 `w` 中.
fn describe_into<W: Write>(r: &BatchReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn duration_to_display(d: Option<Duration>) -> String {
        match d {
            Some(d) => format!("{:.3} s", d.as_secs_f64()),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Stage `{}`:", r.stage())?;
    writeln!(w, "{S4}Input files: {}", r.len())?;
    writeln!(w, "{S4}Processed: {}", r.processed())?;
    writeln!(w, "{S4}Skipped: {}", r.skipped())?;
    writeln!(w, "{S4}Failed: {}", r.failed())?;
    writeln!(w, "{S4}Wall time: {}", duration_to_display(Some(r.elapsed())))?;
    writeln!(w, "{S4}Busy time: {}", duration_to_display(Some(r.busy_time())))?;
    writeln!(
        w,
        "{S4}Average time: {}",
        duration_to_display(r.average_time())
    )?;
    match r.slowest() {
        Some((p, d)) => write!(
            w,
            "{S4}Most time-consuming file `{}` costs {}",
            p.display(),
            duration_to_display(Some(d))
        )?,
        None => write!(w, "{S4}Most time-consuming file: /")?,
    }
    for f in r.files() {
        if let Outcome::Failed(e) = &f.outcome {
            write!(w, "\n{S4}{S4}`{}`: {e}", f.input.display())?;
        }
    }
    Ok(())
}

/// 输出所有阶段的汇总.
pub fn summarize(reports: &[BatchReport]) {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    let mut buf = Vec::with_capacity(512);
    for report in reports {
        buf.clear();
        let written = utils::sep_to(&mut buf)
            .and_then(|_| describe_into(report, &mut buf))
            .and_then(|_| writeln!(&mut buf))
            .and_then(|_| lock.write_all(&buf));
        if let Err(e) = written {
            log::error!("cannot write summary: {e}");
            return;
        }
    }
    if let Err(e) = utils::sep_to(&mut lock) {
        log::error!("cannot write summary: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lung_berry::dataset::LungBatch;
    use lung_berry::LungConfig;

    #[test]
    fn test_describe_failures() {
        let root = tempfile::tempdir().unwrap();
        let img = root.path().join("img");
        std::fs::create_dir(&img).unwrap();
        std::fs::write(img.join("bad.nii.gz"), b"xx").unwrap();
        let report = LungBatch::new(&img, root.path().join("out"), LungConfig::default())
            .unwrap()
            .run()
            .unwrap();

        let mut buf = Vec::new();
        describe_into(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Stage `lung field`:"));
        assert!(text.contains("Failed: 1"));
        assert!(text.contains("Average time: /"));
        assert!(text.contains("bad.nii.gz"));
    }
}
