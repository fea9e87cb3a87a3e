//! 数据集操作.

use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::suffix;
use crate::error::SegmentResult;

pub mod batch;
pub mod naming;

pub use batch::{BatchJob, BatchReport, FileReport, LungBatch, Outcome, VesselBatch};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 列出 `dir` 下所有 `.nii.gz` 文件, 按文件名排序.
///
/// 本程序输出的掩膜文件 (`*_lung_mask.nii.gz`, `*_vessel_mask.nii.gz`) 不在其中.
pub fn list_volumes<P: AsRef<Path>>(dir: P) -> SegmentResult<Vec<PathBuf>> {
    let mut ans = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let is_volume = name.ends_with(suffix::NII_GZ)
            && !name.ends_with(suffix::LUNG_MASK)
            && !name.ends_with(suffix::VESSEL_MASK);
        if is_volume && path.is_file() {
            ans.push(path);
        }
    }
    ans.sort();
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        for name in [
            "b_0000.nii.gz",
            "a.nii.gz",
            "a_lung_mask.nii.gz",
            "a_vessel_mask.nii.gz",
            "notes.txt",
            "c.nii",
        ] {
            fs::write(d.join(name), b"").unwrap();
        }
        fs::create_dir(d.join("sub.nii.gz")).unwrap();

        let found = list_volumes(d).unwrap();
        assert_eq!(found, vec![d.join("a.nii.gz"), d.join("b_0000.nii.gz")]);
        assert!(list_volumes(d.join("missing")).is_err());
    }

    #[test]
    fn test_home_dataset_dir() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                home_dataset_dir_with(["lung", "img"]),
                Some(home.join("dataset").join("lung").join("img"))
            );
        }
    }
}
