//! Values produced by formulas.
//!
//! Every value is immutable and carries a stable identifier handed out by the
//! [registry](super::registry). Operations never modify their operands; they either build a
//! new value, return one of the singletons, or report `None` when the operand types do not
//! support the operation.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::ScriptError;

use super::registry::{self, ObjectId, FIRST_DYNAMIC_ID};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Slots may be empty; empty slots are skipped when printed.
    Array(Vec<Option<ScriptObject>>),
    /// Reflective view over every live object, indexed by identifier.
    ViewForAllObjects,
    /// Has nothing but its identity.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    Xor,
}

pub(crate) struct ObjectCell {
    id: ObjectId,
    value: Value,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        if self.id >= FIRST_DYNAMIC_ID {
            registry::global().forget(self.id);
        }
    }
}

#[derive(Clone)]
pub struct ScriptObject(Arc<ObjectCell>);

impl ScriptObject {
    pub(super) fn with_id(id: ObjectId, value: Value) -> ScriptObject {
        ScriptObject(Arc::new(ObjectCell { id, value }))
    }

    pub(super) fn downgrade(&self) -> Weak<ObjectCell> {
        Arc::downgrade(&self.0)
    }

    pub(super) fn from_cell(cell: Arc<ObjectCell>) -> ScriptObject {
        ScriptObject(cell)
    }

    pub fn null() -> ScriptObject {
        registry::global().singleton(registry::NULL_ID)
    }

    pub fn all_objects() -> ScriptObject {
        registry::global().singleton(registry::ALL_OBJECTS_ID)
    }

    pub fn boolean(value: bool) -> ScriptObject {
        let id = if value {
            registry::TRUE_ID
        } else {
            registry::FALSE_ID
        };
        registry::global().singleton(id)
    }

    pub fn integer(value: i64) -> ScriptObject {
        registry::global().publish(Value::Integer(value))
    }

    pub fn array(items: Vec<Option<ScriptObject>>) -> ScriptObject {
        registry::global().publish(Value::Array(items))
    }

    pub fn new_object() -> ScriptObject {
        registry::global().publish(Value::Opaque)
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn value(&self) -> &Value {
        &self.0.value
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value() {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.value() {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Printable source form of the value.
    pub fn code(&self) -> String {
        match self.value() {
            Value::Null => "null".to_owned(),
            Value::Boolean(value) => value.to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().flatten().map(ScriptObject::code).collect();
                format!("[{}]", items.join(","))
            }
            Value::ViewForAllObjects => "allobj".to_owned(),
            Value::Opaque => "newobj".to_owned(),
        }
    }

    pub fn plus(&self) -> Option<ScriptObject> {
        match self.value() {
            Value::Integer(_) => Some(self.clone()),
            _ => None,
        }
    }

    pub fn minus(&self) -> Option<ScriptObject> {
        self.as_integer()
            .map(|value| ScriptObject::integer(value.wrapping_neg()))
    }

    pub fn negate(&self) -> Option<ScriptObject> {
        self.as_boolean().map(|value| ScriptObject::boolean(!value))
    }

    pub fn add(&self, other: &ScriptObject) -> Option<ScriptObject> {
        match (self.value(), other.value()) {
            (Value::Integer(lhs), Value::Integer(rhs)) => {
                Some(ScriptObject::integer(lhs.wrapping_add(*rhs)))
            }
            (Value::Array(_), Value::Array(rhs)) if rhs.is_empty() => Some(self.clone()),
            (Value::Array(lhs), Value::Array(rhs)) => {
                let items = lhs.iter().chain(rhs.iter()).cloned().collect();
                Some(ScriptObject::array(items))
            }
            _ => None,
        }
    }

    pub fn subtract(&self, other: &ScriptObject) -> Option<ScriptObject> {
        self.integers(other)
            .map(|(lhs, rhs)| ScriptObject::integer(lhs.wrapping_sub(rhs)))
    }

    pub fn multiply(&self, other: &ScriptObject) -> Option<ScriptObject> {
        self.integers(other)
            .map(|(lhs, rhs)| ScriptObject::integer(lhs.wrapping_mul(rhs)))
    }

    /// Truncating division. A zero divisor is a fault, not a type mismatch.
    pub fn divide(&self, other: &ScriptObject) -> Result<Option<ScriptObject>, ScriptError> {
        match self.integers(other) {
            Some((_, 0)) => Err(ScriptError::DivideByZero),
            Some((lhs, rhs)) => Ok(Some(ScriptObject::integer(lhs.wrapping_div(rhs)))),
            None => Ok(None),
        }
    }

    pub fn modulo(&self, other: &ScriptObject) -> Result<Option<ScriptObject>, ScriptError> {
        match self.integers(other) {
            Some((_, 0)) => Err(ScriptError::DivideByZero),
            Some((lhs, rhs)) => Ok(Some(ScriptObject::integer(lhs.wrapping_rem(rhs)))),
            None => Ok(None),
        }
    }

    pub fn and(&self, other: &ScriptObject) -> Option<ScriptObject> {
        self.booleans(other)
            .map(|(lhs, rhs)| ScriptObject::boolean(lhs && rhs))
    }

    pub fn or(&self, other: &ScriptObject) -> Option<ScriptObject> {
        self.booleans(other)
            .map(|(lhs, rhs)| ScriptObject::boolean(lhs || rhs))
    }

    pub fn xor(&self, other: &ScriptObject) -> Option<ScriptObject> {
        self.booleans(other)
            .map(|(lhs, rhs)| ScriptObject::boolean(lhs != rhs))
    }

    /// Member access. Only the all-objects view has members: its members are the live
    /// objects, keyed by identifier.
    pub fn get(&self, other: &ScriptObject) -> Option<ScriptObject> {
        match (self.value(), other.value()) {
            (Value::ViewForAllObjects, Value::Integer(id)) => {
                let id = ObjectId::try_from(*id).ok()?;
                registry::global().lookup(id)
            }
            _ => None,
        }
    }

    pub fn apply(
        &self,
        op: BinaryOp,
        other: &ScriptObject,
    ) -> Result<Option<ScriptObject>, ScriptError> {
        match op {
            BinaryOp::Add => Ok(self.add(other)),
            BinaryOp::Subtract => Ok(self.subtract(other)),
            BinaryOp::Multiply => Ok(self.multiply(other)),
            BinaryOp::Divide => self.divide(other),
            BinaryOp::Modulo => self.modulo(other),
            BinaryOp::And => Ok(self.and(other)),
            BinaryOp::Or => Ok(self.or(other)),
            BinaryOp::Xor => Ok(self.xor(other)),
        }
    }

    fn integers(&self, other: &ScriptObject) -> Option<(i64, i64)> {
        Some((self.as_integer()?, other.as_integer()?))
    }

    fn booleans(&self, other: &ScriptObject) -> Option<(bool, bool)> {
        Some((self.as_boolean()?, other.as_boolean()?))
    }
}

/// Values compare structurally, except opaque objects, which are equal only to themselves.
impl PartialEq for ScriptObject {
    fn eq(&self, other: &ScriptObject) -> bool {
        match (self.value(), other.value()) {
            (Value::Opaque, Value::Opaque) => self.id() == other.id(),
            (lhs, rhs) => lhs == rhs,
        }
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.value(), self.id())
    }
}

impl fmt::Display for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}
