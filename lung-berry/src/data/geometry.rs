//! 体数据的空间元信息 (分辨率, 原点, 方向).

use crate::error::{SegmentError, SegmentResult};
use nifti::NiftiHeader;

/// `NIFTI_XFORM_SCANNER_ANAT`.
const XFORM_SCANNER_ANAT: i16 = 1;

/// 判断方向矩阵正交性的容差.
const ORTHONORMAL_EPS: f64 = 1e-4;

/// 3D 体数据的空间元信息.
///
/// 所有分量均以 **物理** `(x, y, z)` 顺序存储 (与 nifti 文件一致),
/// 与数组索引 `(z, h, w)` 的顺序相反. 坐标系沿用 nifti 的 RAS+ 约定.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geometry {
    /// 单个体素在三个轴上的物理尺寸 (毫米), 必须严格为正.
    pub spacing: [f64; 3],

    /// 体素 `[0, 0, 0]` 中心的物理坐标 (毫米).
    pub origin: [f64; 3],

    /// 方向矩阵, 第 `j` 列是第 `j` 个索引轴在物理空间中的单位方向. 必须正交.
    pub direction: [[f64; 3]; 3],
}

impl Default for Geometry {
    #[inline]
    fn default() -> Self {
        Self::with_spacing([1.0; 3])
    }
}

impl Geometry {
    /// 单位方向矩阵.
    pub const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    /// 构建并检查空间元信息.
    pub fn new(
        spacing: [f64; 3],
        origin: [f64; 3],
        direction: [[f64; 3]; 3],
    ) -> SegmentResult<Self> {
        let ans = Self {
            spacing,
            origin,
            direction,
        };
        ans.validate()?;
        Ok(ans)
    }

    /// 原点为 0, 方向为单位阵的空间元信息. 不做检查.
    #[inline]
    pub const fn with_spacing(spacing: [f64; 3]) -> Self {
        Self {
            spacing,
            origin: [0.0; 3],
            direction: Self::IDENTITY,
        }
    }

    /// 检查不变量: 分辨率严格为正且有限, 方向矩阵正交.
    pub fn validate(&self) -> SegmentResult<()> {
        if let Some(s) = self.spacing.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(SegmentError::InvalidGeometry(format!(
                "spacing must be positive, got {s} in {:?}",
                self.spacing
            )));
        }
        // D^T D == I
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3)
                    .map(|k| self.direction[k][i] * self.direction[k][j])
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                if !((dot - expected).abs() <= ORTHONORMAL_EPS) {
                    return Err(SegmentError::InvalidGeometry(format!(
                        "direction is not orthonormal: {:?}",
                        self.direction
                    )));
                }
            }
        }
        Ok(())
    }

    /// 单个体素的体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// 从 nifti header 解析空间元信息.
    ///
    /// 优先使用 sform, 其次 qform, 都不存在时退化为单位方向 + 零原点.
    /// `pixdim` 为 0 的轴按 1 毫米处理.
    pub fn from_header(h: &NiftiHeader) -> Self {
        let [qfac, sx, sy, sz, ..] = h.pixdim;
        let spacing = [sx, sy, sz].map(|s| match (s as f64).abs() {
            s if s > 0.0 && s.is_finite() => s,
            _ => 1.0,
        });

        if h.sform_code > 0 {
            let rows = [h.srow_x, h.srow_y, h.srow_z].map(|r| r.map(f64::from));
            let mut direction = [[0.0; 3]; 3];
            for j in 0..3 {
                let norm = (0..3).map(|i| rows[i][j].powi(2)).sum::<f64>().sqrt();
                for i in 0..3 {
                    direction[i][j] = if norm > 0.0 {
                        rows[i][j] / norm
                    } else {
                        Self::IDENTITY[i][j]
                    };
                }
            }
            let origin = [rows[0][3], rows[1][3], rows[2][3]];
            Self {
                spacing,
                origin,
                direction,
            }
        } else if h.qform_code > 0 {
            let (b, c, d) = (
                h.quatern_b as f64,
                h.quatern_c as f64,
                h.quatern_d as f64,
            );
            let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
            let mut direction = [
                [
                    a * a + b * b - c * c - d * d,
                    2.0 * (b * c - a * d),
                    2.0 * (b * d + a * c),
                ],
                [
                    2.0 * (b * c + a * d),
                    a * a + c * c - b * b - d * d,
                    2.0 * (c * d - a * b),
                ],
                [
                    2.0 * (b * d - a * c),
                    2.0 * (c * d + a * b),
                    a * a + d * d - c * c - b * b,
                ],
            ];
            if qfac < 0.0 {
                direction.iter_mut().for_each(|row| row[2] = -row[2]);
            }
            let origin = [h.quatern_x, h.quatern_y, h.quatern_z].map(f64::from);
            Self {
                spacing,
                origin,
                direction,
            }
        } else {
            Self::with_spacing(spacing)
        }
    }

    /// 将空间元信息写入 nifti header (`pixdim` 与 sform). qform 被置为未知.
    pub fn write_header(&self, h: &mut NiftiHeader) {
        h.pixdim[0] = 1.0;
        for (p, s) in h.pixdim[1..4].iter_mut().zip(self.spacing) {
            *p = s as f32;
        }
        let row = |i: usize| -> [f32; 4] {
            [
                (self.direction[i][0] * self.spacing[0]) as f32,
                (self.direction[i][1] * self.spacing[1]) as f32,
                (self.direction[i][2] * self.spacing[2]) as f32,
                self.origin[i] as f32,
            ]
        };
        h.srow_x = row(0);
        h.srow_y = row(1);
        h.srow_z = row(2);
        h.sform_code = XFORM_SCANNER_ANAT;
        h.qform_code = 0;
    }

    /// 两个空间元信息是否在 `eps` 容差内相同.
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= eps;
        self.spacing
            .iter()
            .zip(other.spacing.iter())
            .chain(self.origin.iter().zip(other.origin.iter()))
            .chain(self.direction.iter().flatten().zip(other.direction.iter().flatten()))
            .all(|(a, b)| close(*a, *b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_invalid_geometry() {
        assert!(Geometry::new([1.0, 0.0, 1.0], [0.0; 3], Geometry::IDENTITY).is_err());
        assert!(Geometry::new([1.0, f64::NAN, 1.0], [0.0; 3], Geometry::IDENTITY).is_err());
        let sheared = [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(Geometry::new([1.0; 3], [0.0; 3], sheared).is_err());
        assert!(Geometry::new([0.7, 0.7, 2.5], [1.0, -2.0, 3.0], Geometry::IDENTITY).is_ok());
    }

    #[test]
    fn test_header_round_trip() {
        // x -> -x, y -> z, z -> y.
        let direction = [[-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        let g = Geometry::new([0.75, 0.8, 2.5], [-120.5, 33.0, 7.25], direction).unwrap();

        let mut header = NiftiHeader::default();
        g.write_header(&mut header);
        let back = Geometry::from_header(&header);
        assert!(g.approx_eq(&back, 1e-5), "{g:?} != {back:?}");
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_qform_decoding() {
        let mut header = NiftiHeader::default();
        header.pixdim = [-1.0, 0.5, 0.5, 3.0, 0.0, 0.0, 0.0, 0.0];
        header.sform_code = 0;
        header.qform_code = 1;
        // 绕 z 轴旋转 180 度.
        (header.quatern_b, header.quatern_c, header.quatern_d) = (0.0, 0.0, 1.0);
        (header.quatern_x, header.quatern_y, header.quatern_z) = (10.0, 20.0, -5.0);

        let g = Geometry::from_header(&header);
        assert_eq!(g.spacing, [0.5, 0.5, 3.0]);
        assert_eq!(g.origin, [10.0, 20.0, -5.0]);
        let expected = [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]];
        assert!(g.approx_eq(
            &Geometry {
                direction: expected,
                ..g
            },
            1e-9
        ));
    }

    #[test]
    fn test_no_transform_falls_back_to_identity() {
        let mut header = NiftiHeader::default();
        header.pixdim = [1.0, 2.0, 0.0, 1.5, 0.0, 0.0, 0.0, 0.0];
        header.sform_code = 0;
        header.qform_code = 0;
        let g = Geometry::from_header(&header);
        assert_eq!(g.spacing, [2.0, 1.0, 1.5]);
        assert_eq!(g.direction, Geometry::IDENTITY);
        assert_eq!(g.origin, [0.0; 3]);
    }
}
