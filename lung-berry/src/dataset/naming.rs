//! 批处理文件命名规则.
//!
//! - CT 扫描 `X.nii.gz` 的肺野掩膜为 `X_lung_mask.nii.gz`;
//! - 血管掩膜为 `X_vessel_mask.nii.gz`;
//! - nnU-Net 风格的单通道文件 `Y_0000.nii.gz` 的肺野掩膜也可以是 `Y_lung_mask.nii.gz`.

use std::path::{Path, PathBuf};

use crate::consts::suffix;
use crate::error::{SegmentError, SegmentResult};

/// 获取 nifti 文件名去掉 `.nii.gz` 或 `.nii` 扩展名后的部分.
///
/// 不是 nifti 文件时返回 `None`.
pub fn volume_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(suffix::NII_GZ)
        .or_else(|| name.strip_suffix(suffix::NII))
        .filter(|s| !s.is_empty())
}

/// 肺野掩膜文件名.
#[inline]
pub fn lung_mask_name(stem: &str) -> String {
    format!("{stem}{}", suffix::LUNG_MASK)
}

/// 血管掩膜文件名.
#[inline]
pub fn vessel_mask_name(stem: &str) -> String {
    format!("{stem}{}", suffix::VESSEL_MASK)
}

/// 在 `mask_dir` 下, 按查找顺序列出 `stem` 对应的所有可能的肺野掩膜路径.
pub fn companion_candidates(mask_dir: &Path, stem: &str) -> Vec<PathBuf> {
    let mut ans = vec![mask_dir.join(lung_mask_name(stem))];
    if let Some(base) = stem
        .strip_suffix(suffix::CHANNEL_0000)
        .filter(|s| !s.is_empty())
    {
        ans.push(mask_dir.join(lung_mask_name(base)));
    }
    ans
}

/// 在 `mask_dir` 下查找 CT 扫描 `volume` 对应的肺野掩膜. 返回第一个存在的候选路径.
pub fn find_companion(mask_dir: &Path, volume: &Path) -> SegmentResult<PathBuf> {
    let tried = match volume_stem(volume) {
        Some(stem) => companion_candidates(mask_dir, stem),
        None => Vec::new(),
    };
    match tried.iter().find(|p| p.is_file()) {
        Some(p) => Ok(p.clone()),
        None => Err(SegmentError::MissingCompanionFile {
            volume: volume.to_path_buf(),
            tried,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_volume_stem() {
        assert_eq!(volume_stem(Path::new("/a/b/case_0000.nii.gz")), Some("case_0000"));
        assert_eq!(volume_stem(Path::new("scan.nii")), Some("scan"));
        assert_eq!(volume_stem(Path::new("scan.npz")), None);
        assert_eq!(volume_stem(Path::new(".nii.gz")), None);
        assert_eq!(lung_mask_name("OSIC_1"), "OSIC_1_lung_mask.nii.gz");
        assert_eq!(vessel_mask_name("OSIC_1_0000"), "OSIC_1_0000_vessel_mask.nii.gz");
    }

    #[test]
    fn test_companion_lookup_order() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path();
        let volume = Path::new("/img/case_0000.nii.gz");

        let err = find_companion(d, volume).unwrap_err();
        match err {
            SegmentError::MissingCompanionFile { tried, .. } => {
                assert_eq!(
                    tried,
                    vec![d.join("case_0000_lung_mask.nii.gz"), d.join("case_lung_mask.nii.gz")]
                );
            }
            e => panic!("unexpected error {e}"),
        }

        fs::write(d.join("case_lung_mask.nii.gz"), b"").unwrap();
        assert_eq!(find_companion(d, volume).unwrap(), d.join("case_lung_mask.nii.gz"));

        fs::write(d.join("case_0000_lung_mask.nii.gz"), b"").unwrap();
        assert_eq!(
            find_companion(d, volume).unwrap(),
            d.join("case_0000_lung_mask.nii.gz")
        );

        // 没有通道后缀时只有一个候选.
        assert_eq!(companion_candidates(d, "plain").len(), 1);
        assert_eq!(companion_candidates(d, "_0000").len(), 1);
    }
}
