use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayD, ArrayView3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::gray::*;
use crate::error::{SegmentError, SegmentResult};
use crate::Idx3d;

pub mod geometry;
pub(crate) mod lanes;
pub mod morph_3d;
pub mod window;

pub use geometry::Geometry;
pub use window::CtWindow;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 读取 nifti 文件, 返回 header 和 `(z, H, W)` 排列的 `f32` 数据.
///
/// 数据已经按 `scl_slope`/`scl_inter` 换算. 允许末尾存在长度为 1 的第 4 维.
fn read_nifti_f32(path: &Path) -> SegmentResult<(BoxedHeader, Array3<f32>)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());

    let mut data: ArrayD<f32> = obj.into_volume().into_ndarray()?;
    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }

    // [W, H, z] -> [z, H, W].
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = data
        .into_dimensionality::<Ix3>()?
        .permuted_axes([2, 1, 0]);
    let data = if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().into_owned()
    };
    Ok((header, data))
}

/// 以 `header` 为模板, 将 `(z, H, W)` 排列的数据写为 nifti 文件.
/// 扩展名为 `.gz` 时自动压缩.
macro_rules! write_nifti {
    ($path: expr, $header: expr, $data: expr) => {{
        let mut reference = $header.clone();
        // 掩膜和中间结果按原值存储, 不再需要 CT 扫描的线性换算.
        reference.scl_slope = 1.0;
        reference.scl_inter = 0.0;
        // [z, H, W] -> [W, H, z].
        WriterOptions::new($path)
            .reference_header(&reference)
            .write_nifti(&$data.permuted_axes([2, 1, 0]))
            .map_err(SegmentError::from)
    }};
}

/// 用 `geometry` 为形状为 `(z, H, W)` 的数据生成最小可用 header.
fn synthetic_header((z, h, w): Idx3d, geometry: &Geometry) -> BoxedHeader {
    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    geometry.write_header(&mut header);
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

/// 以 `reference` 的 header 为模板, 将 `(z, H, W)` 排列的 `u8` 中间结果写入 `path`.
///
/// 形状不一致时返回 `Err`.
pub fn save_u8_like<T: VolumeAttr + ?Sized, P: AsRef<Path>>(
    reference: &T,
    data: ArrayView3<u8>,
    path: P,
) -> SegmentResult<()> {
    check_congruent(reference, data.dim())?;
    write_nifti!(path.as_ref(), reference.header(), data)
}

/// 以 `reference` 的 header 为模板, 将 `(z, H, W)` 排列的 `f32` 中间结果写入 `path`.
///
/// 形状不一致时返回 `Err`.
pub fn save_f32_like<T: VolumeAttr + ?Sized, P: AsRef<Path>>(
    reference: &T,
    data: ArrayView3<f32>,
    path: P,
) -> SegmentResult<()> {
    check_congruent(reference, data.dim())?;
    write_nifti!(path.as_ref(), reference.header(), data)
}

#[inline]
fn check_congruent<T: VolumeAttr + ?Sized>(reference: &T, shape: Idx3d) -> SegmentResult<()> {
    if reference.shape() == shape {
        Ok(())
    } else {
        Err(SegmentError::InputShapeMismatch {
            volume: reference.shape(),
            mask: shape,
        })
    }
}

/// 3D 体数据 header 的共用属性和部分通用操作.
pub trait VolumeAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小, 以 `(z, H, W)` 排列.
    fn shape(&self) -> Idx3d;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 获取空间元信息 (分辨率, 原点, 方向).
    #[inline]
    fn geometry(&self) -> Geometry {
        Geometry::from_header(self.header())
    }

    /// 获取单个体素分辨率, 以毫米为单位, 按 `(x, y, z)` 排列.
    #[inline]
    fn spacing(&self) -> [f64; 3] {
        self.geometry().spacing
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.geometry().voxel_volume()
    }

    /// 与 `other` 形状是否一致 (可逐体素叠加).
    #[inline]
    fn is_congruent<T: VolumeAttr + ?Sized>(&self, other: &T) -> bool {
        self.shape() == other.shape()
    }
}

/// nii 格式 3D CT 扫描, 包括 header 和 CT 扫描 (HU). HU 值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct CtVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl VolumeAttr for CtVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for CtVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl CtVolume {
    /// 打开 nii 文件格式的 3D CT 扫描. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> SegmentResult<Self> {
        let (header, data) = read_nifti_f32(path.as_ref())?;
        Ok(Self { header, data })
    }

    /// 根据 `(z, H, W)` 排列的裸数据和空间元信息直接创建 `CtVolume`.
    ///
    /// 如果 `geometry` 不满足不变量, 返回 `Err`.
    pub fn from_array(data: Array3<f32>, geometry: &Geometry) -> SegmentResult<Self> {
        geometry.validate()?;
        let header = synthetic_header(data.dim(), geometry);
        Ok(Self { header, data })
    }

    /// 以 `f32` 格式写入 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SegmentResult<()> {
        write_nifti!(path.as_ref(), self.header, self.data.view())
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 计算 `mask` 前景内 CT HU 值的平均值. 前景为空时返回 `None`.
    ///
    /// 形状不一致时返回 `Err`.
    pub fn mean_hu_within(&self, mask: &BinaryMask) -> SegmentResult<Option<f64>> {
        check_congruent(self, mask.shape())?;
        let mut count = 0u64;
        let mut hu = 0.0;
        ndarray::Zip::from(&self.data)
            .and(&mask.data)
            .for_each(|v, m| {
                if is_foreground(*m) {
                    count += 1;
                    hu += *v as f64;
                }
            });
        Ok((count != 0).then(|| hu / (count as f64)))
    }
}

/// nii 格式 3D 二值掩膜, 包括 header 和掩膜数据. 取值只允许是 0 或 1, 以 `u8` 保存.
///
/// header 与来源 CT 扫描相同, 因此可以逐体素叠加.
#[derive(Debug, Clone)]
pub struct BinaryMask {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl VolumeAttr for BinaryMask {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for BinaryMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl BinaryMask {
    /// 打开 nii 文件格式的 3D 掩膜. 所有非零体素都视为前景.
    pub fn open<P: AsRef<Path>>(path: P) -> SegmentResult<Self> {
        let (header, data) = read_nifti_f32(path.as_ref())?;
        let data = data.mapv(|v| if v != 0.0 { MASK_FOREGROUND } else { MASK_BACKGROUND });
        Ok(Self { header, data })
    }

    /// 以来源 `src` 的空间元信息包装 `data`. 所有非零体素都被规范为 1.
    ///
    /// 如果形状不一致, 返回 `Err`.
    pub fn like<T: VolumeAttr + ?Sized>(src: &T, data: Array3<u8>) -> SegmentResult<Self> {
        check_congruent(src, data.dim())?;
        let mut data = data;
        data.mapv_inplace(|v| if is_foreground(v) { MASK_FOREGROUND } else { MASK_BACKGROUND });
        Ok(Self {
            header: Box::new(src.header().clone()),
            data,
        })
    }

    /// 根据 `(z, H, W)` 排列的裸数据和空间元信息直接创建掩膜.
    pub fn from_array(data: Array3<u8>, geometry: &Geometry) -> SegmentResult<Self> {
        geometry.validate()?;
        let header = synthetic_header(data.dim(), geometry);
        let mut data = data;
        data.mapv_inplace(|v| if is_foreground(v) { MASK_FOREGROUND } else { MASK_BACKGROUND });
        Ok(Self { header, data })
    }

    /// 以 `u8` 格式写入 `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SegmentResult<()> {
        write_nifti!(path.as_ref(), self.header, self.data.view())
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获取前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| is_foreground(**p)).count()
    }

    /// 前景实际体积, 以立方毫米为单位.
    #[inline]
    pub fn volume_mm3(&self) -> f64 {
        self.count() as f64 * self.voxel()
    }

    /// `self` 的前景是否完全包含于 `other` 的前景.
    ///
    /// 形状不一致时返回 `false`.
    pub fn is_subset_of(&self, other: &BinaryMask) -> bool {
        self.is_congruent(other)
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| is_background(*a) || is_foreground(*b))
    }
}
