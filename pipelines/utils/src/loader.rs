//! 对 `lung-berry::dataset` 的更一层封装. 提供默认的数据集目录.
//!
//! 目录布局与原始数据集一致:
//!
//! ```text
//! $HOME/dataset/lung/img/        CT 扫描
//! $HOME/dataset/lung/lung_mask/  肺野掩膜
//! $HOME/dataset/lung/vessel/     肺血管掩膜
//! ```

use lung_berry::dataset::home_dataset_dir_with;
use std::env;
use std::path::PathBuf;

/// 环境变量 `var` 非空时返回其值, 否则返回 `$HOME/dataset/lung/{leaf}`.
///
/// 两者都不可用时 (既没有设置环境变量, 也找不到用户主目录) 返回 `None`.
fn dir_from_env_or_home(var: &str, leaf: &str) -> Option<PathBuf> {
    match env::var_os(var) {
        Some(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(["lung", leaf]),
    }
}

/// 获取 CT 扫描目录.
///
/// 1. 若环境变量 `$LUNG_IMG_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/lung/img`.
#[inline]
pub fn img_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("LUNG_IMG_DIR", "img")
}

/// 获取肺野掩膜目录.
///
/// 1. 若环境变量 `$LUNG_MASK_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/lung/lung_mask`.
#[inline]
pub fn mask_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("LUNG_MASK_DIR", "lung_mask")
}

/// 获取肺血管掩膜目录.
///
/// 1. 若环境变量 `$LUNG_VESSEL_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/lung/vessel`.
#[inline]
pub fn vessel_dir_from_env_or_home() -> Option<PathBuf> {
    dir_from_env_or_home("LUNG_VESSEL_DIR", "vessel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_fallback() {
        // 使用一个不会被设置的变量名, 避免与其它测试竞争环境变量.
        let d = dir_from_env_or_home("LUNG_BERRY_UNSET_FOR_TEST", "img");
        assert_eq!(d, home_dataset_dir_with(["lung", "img"]));
    }
}
