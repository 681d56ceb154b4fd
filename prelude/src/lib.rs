pub use nalgebra;

#[allow(non_camel_case_types)]
pub type float = f64;

pub const PI: float = std::f64::consts::PI;
pub const INFINITY: float = f64::INFINITY;
pub const NEG_INFINITY: float = f64::NEG_INFINITY;

pub fn min<T: PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

pub fn max<T: PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

pub fn deg2rad(x: float) -> float {
    x * PI / 180.0
}

pub fn rad2deg(x: float) -> float {
    x * 180.0 / PI
}

pub type Matrix<const R: usize, const C: usize> = nalgebra::SMatrix<float, R, C>;
pub type Vector<const D: usize> = nalgebra::SVector<float, D>;
