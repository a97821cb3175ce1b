use std::fmt;

/// A scalar operator parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    F32(f32),
    F64(f64),
    I32(i32),
    I64(i64),
    Bool(bool),
}

impl Param {
    /// Name of the stored kind, as reported in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Param::F32(_) => "f32",
            Param::F64(_) => "f64",
            Param::I32(_) => "i32",
            Param::I64(_) => "i64",
            Param::Bool(_) => "bool",
        }
    }

    /// Returns the stored value if it is exactly of kind `T`.
    ///
    /// No numeric conversion is performed: an `I32` parameter read as `f32`
    /// yields `None`.
    pub fn get<T: ParamType>(&self) -> Option<T> {
        T::from_param(self)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::F32(v) => write!(f, "{}f32", v),
            Param::F64(v) => write!(f, "{}f64", v),
            Param::I32(v) => write!(f, "{}i32", v),
            Param::I64(v) => write!(f, "{}i64", v),
            Param::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A Rust type that can be stored in a [`Param`].
pub trait ParamType: Sized {
    const KIND: &'static str;

    fn from_param(param: &Param) -> Option<Self>;
}

macro_rules! impl_param_type {
    ($($ty:ty => $variant:ident, $kind:literal),* $(,)?) => {
        $(
            impl ParamType for $ty {
                const KIND: &'static str = $kind;

                fn from_param(param: &Param) -> Option<Self> {
                    match param {
                        Param::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::$variant(v)
                }
            }
        )*
    };
}

impl_param_type! {
    f32 => F32, "f32",
    f64 => F64, "f64",
    i32 => I32, "i32",
    i64 => I64, "i64",
    bool => Bool, "bool",
}
