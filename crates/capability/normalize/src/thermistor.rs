//! 电阻型温度传感器换算。

/// 电阻 ↔ 温度（°C）换算策略。
pub trait TemperatureConverter: Send + Sync {
    /// 欧姆 -> 摄氏度。
    fn to_celsius(&self, ohms: f64) -> f64;

    /// 摄氏度 -> 欧姆。
    fn to_ohms(&self, celsius: f64) -> f64;

    fn name(&self) -> &str;
}

const KELVIN_OFFSET: f64 = 273.15;

/// NTC 热敏电阻，Steinhart–Hart 方程 `1/T = A + B·ln(R) + C·ln(R)^3`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteinhartHart {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl SteinhartHart {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// 10K Type II（25°C 时 10kΩ）。
    pub fn ntc_10k_type2() -> Self {
        Self::new(1.009_249_522e-3, 2.378_405_444e-4, 2.019_202_697e-7)
    }

    /// 10K Type III。
    pub fn ntc_10k_type3() -> Self {
        Self::new(1.028_444_736e-3, 2.392_435_66e-4, 1.562_216_81e-7)
    }
}

impl TemperatureConverter for SteinhartHart {
    fn to_celsius(&self, ohms: f64) -> f64 {
        let ln_r = ohms.ln();
        1.0 / (self.a + self.b * ln_r + self.c * ln_r.powi(3)) - KELVIN_OFFSET
    }

    fn to_ohms(&self, celsius: f64) -> f64 {
        // 三次方程闭式解
        let kelvin = celsius + KELVIN_OFFSET;
        let x = (self.a - 1.0 / kelvin) / self.c;
        let y = ((self.b / (3.0 * self.c)).powi(3) + x * x / 4.0).sqrt();
        ((y - x / 2.0).cbrt() - (y + x / 2.0).cbrt()).exp()
    }

    fn name(&self) -> &str {
        "steinhart_hart"
    }
}

/// 铂电阻线性近似 `R = R0·(1 + α·T)`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rtd {
    pub r0: f64,
    pub alpha: f64,
}

impl Rtd {
    pub fn pt100() -> Self {
        Self {
            r0: 100.0,
            alpha: 0.003_85,
        }
    }

    pub fn pt1000() -> Self {
        Self {
            r0: 1000.0,
            alpha: 0.003_85,
        }
    }
}

impl TemperatureConverter for Rtd {
    fn to_celsius(&self, ohms: f64) -> f64 {
        (ohms / self.r0 - 1.0) / self.alpha
    }

    fn to_ohms(&self, celsius: f64) -> f64 {
        self.r0 * (1.0 + self.alpha * celsius)
    }

    fn name(&self) -> &str {
        "rtd"
    }
}
