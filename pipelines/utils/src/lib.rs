//! 批处理程序依赖的通用组件.

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sep_and_cpus() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SEP.len() + 1);
        assert!(cpus() >= 1);
    }
}
