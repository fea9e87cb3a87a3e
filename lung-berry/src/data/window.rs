/// CT 窗口, 由窗下限和窗上限 (HU) 描述.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CtWindow {
    lower: f64,
    upper: f64,
}

impl CtWindow {
    /// 通过窗下限和窗上限构建 CT 窗. 要求 `lower < upper`, 否则返回 `None`.
    pub fn from_bounds(lower: f64, upper: f64) -> Option<CtWindow> {
        (lower.is_finite() && upper.is_finite() && lower < upper).then_some(Self { lower, upper })
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度分布点 (0.0 <= value <= 255.0).
    ///
    /// 计算方式为 `255 * (ct - lower) / (upper - lower)`, 再截断到 \[0, 255\].
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f64) -> Option<f64> {
        if !ct.is_finite() {
            return None;
        }
        let v = 255.0 * (ct - self.lower) / self.width();
        Some(v.clamp(0.0, 255.0))
    }
}
