use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Result, TensorError};
use crate::param::{Param, ParamType};
use crate::tensor::Tensor;

/// Tensors bound to an operator call, keyed by role ("input", "output", ...).
///
/// Tensors are handles, so an operator writing into a bound tensor writes
/// into the caller's storage.
pub type Data = HashMap<String, Tensor>;

/// Scalar parameters of an operator call, keyed by name.
pub type Para = HashMap<String, Param>;

/// A named, stateless computation executed by a device.
///
/// Each device kind provides its own implementation for the operator names
/// it supports.
pub trait Operator: Send + Sync + Debug {
    /// Name under which the operator is registered (e.g., "Add").
    fn name(&self) -> &str;

    /// Reads the tensors and parameters it needs and writes its outputs
    /// into `data`.
    fn run(&self, data: &mut Data, para: &Para) -> Result<()>;
}

/// Looks up the tensor bound to `role`.
pub fn binding<'d>(data: &'d Data, role: &str) -> Result<&'d Tensor> {
    data.get(role)
        .ok_or_else(|| TensorError::MissingBinding(role.to_string()))
}

/// Looks up the tensor bound to `role` for writing.
pub fn binding_mut<'d>(data: &'d mut Data, role: &str) -> Result<&'d mut Tensor> {
    data.get_mut(role)
        .ok_or_else(|| TensorError::MissingBinding(role.to_string()))
}

/// Reads parameter `name` as `T`.
///
/// # Errors
/// `MissingParam` if absent, `ParamTypeMismatch` if stored as another kind.
pub fn param<T: ParamType>(para: &Para, name: &str) -> Result<T> {
    let value = para
        .get(name)
        .ok_or_else(|| TensorError::MissingParam(name.to_string()))?;
    value.get::<T>().ok_or_else(|| TensorError::ParamTypeMismatch {
        name: name.to_string(),
        expected: T::KIND,
        got: value.kind(),
    })
}

/// Operators a device can execute, keyed by name.
///
/// Filled while the device is being constructed; devices only hand out
/// shared references afterwards.
#[derive(Debug, Default)]
pub struct OperatorRegistry {
    ops: HashMap<String, Box<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `op` under its own name.
    ///
    /// # Errors
    /// `DuplicateOperator` if the name is already taken.
    pub fn register<O: Operator + 'static>(&mut self, op: O) -> Result<()> {
        let name = op.name().to_string();
        if self.ops.contains_key(&name) {
            return Err(TensorError::DuplicateOperator(name));
        }
        self.ops.insert(name, Box::new(op));
        Ok(())
    }

    /// Adds `op` under its own name, returning the operator it replaces.
    pub fn insert<O: Operator + 'static>(&mut self, op: O) -> Option<Box<dyn Operator>> {
        self.ops.insert(op.name().to_string(), Box::new(op))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Operator> {
        self.ops.get(name).map(|op| op.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ops.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
