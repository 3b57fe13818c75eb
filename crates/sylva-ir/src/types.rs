//! The sylva type system.
//!
//! Two families of types flow through the IR. *Value* types carry data:
//! bit-vectors of a fixed width, IEEE floats, pointers, arrays, structs, and
//! function signatures. *State* types carry ordering only: memory state, I/O
//! state, and control values (branch/loop predicates with a statically known
//! number of alternatives).
//!
//! Types have structural equality -- two types are the same type iff they are
//! built the same way. There is no registry or nominal identity layer;
//! `PartialEq`/`Eq`/`Hash` are derived and used directly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A type in the sylva IR. See the module docs for the value/state split.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Bit-vector of the given width (e.g. `Bits { width: 32 }` for i32).
    Bits { width: u32 },

    /// IEEE float of a specific precision.
    Float { size: FloatSize },

    /// Pointer to a pointee type.
    Pointer { pointee: Box<Type> },

    /// Fixed-size array: `[T; N]`.
    Array { element: Box<Type>, length: u32 },

    /// Struct with a declared field layout.
    Struct { fields: Vec<Type>, packed: bool },

    /// Function signature.
    Function(FunctionType),

    /// Control value with `alternatives` possible outcomes. Produced by
    /// `Match`, consumed by branches and gamma/theta predicates.
    Control { alternatives: u32 },

    /// Memory ordering state.
    MemState,

    /// I/O ordering state.
    IoState,
}

/// Supported floating point precisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatSize {
    Half,
    Single,
    Double,
}

/// An ordered function signature: operand types and result types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub arguments: Vec<Type>,
    pub results: Vec<Type>,
}

impl FunctionType {
    pub fn new(arguments: Vec<Type>, results: Vec<Type>) -> Self {
        FunctionType { arguments, results }
    }

    pub fn narguments(&self) -> usize {
        self.arguments.len()
    }

    pub fn nresults(&self) -> usize {
        self.results.len()
    }
}

impl Type {
    /// Shorthand for a bit-vector type.
    pub fn bits(width: u32) -> Self {
        Type::Bits { width }
    }

    /// Shorthand for a pointer type.
    pub fn pointer(pointee: Type) -> Self {
        Type::Pointer {
            pointee: Box::new(pointee),
        }
    }

    /// Shorthand for a control type.
    pub fn control(alternatives: u32) -> Self {
        Type::Control { alternatives }
    }

    /// Returns `true` if this type carries data.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            Type::Bits { .. }
                | Type::Float { .. }
                | Type::Pointer { .. }
                | Type::Array { .. }
                | Type::Struct { .. }
                | Type::Function(_)
        )
    }

    /// Returns `true` if this type carries ordering only.
    ///
    /// State types are `MemState`, `IoState`, and `Control`.
    pub fn is_state_type(&self) -> bool {
        !self.is_value_type()
    }

    /// The pointee type, if this is a pointer.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bits { width } => write!(f, "bits{}", width),
            Type::Float { size } => match size {
                FloatSize::Half => write!(f, "f16"),
                FloatSize::Single => write!(f, "f32"),
                FloatSize::Double => write!(f, "f64"),
            },
            Type::Pointer { pointee } => write!(f, "ptr[{}]", pointee),
            Type::Array { element, length } => write!(f, "array[{}; {}]", element, length),
            Type::Struct { fields, packed } => {
                write!(f, "{}{{", if *packed { "packed" } else { "struct" })?;
                for (n, field) in fields.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "}}")
            }
            Type::Function(fct) => {
                write!(f, "fn(")?;
                for (n, arg) in fct.arguments.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ") -> (")?;
                for (n, res) in fct.results.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", res)?;
                }
                write!(f, ")")
            }
            Type::Control { alternatives } => write!(f, "ctl{}", alternatives),
            Type::MemState => write!(f, "mem"),
            Type::IoState => write!(f, "io"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(Type::bits(32), Type::bits(32));
        assert_ne!(Type::bits(32), Type::bits(64));
        assert_eq!(
            Type::pointer(Type::bits(8)),
            Type::Pointer {
                pointee: Box::new(Type::Bits { width: 8 })
            }
        );
        assert_ne!(Type::pointer(Type::bits(8)), Type::pointer(Type::bits(16)));
    }

    #[test]
    fn value_state_split() {
        assert!(Type::bits(1).is_value_type());
        assert!(Type::pointer(Type::bits(32)).is_value_type());
        assert!(Type::Function(FunctionType::new(vec![], vec![])).is_value_type());
        assert!(Type::MemState.is_state_type());
        assert!(Type::IoState.is_state_type());
        assert!(Type::control(2).is_state_type());
        assert!(!Type::MemState.is_value_type());
    }

    #[test]
    fn display() {
        assert_eq!(Type::bits(32).to_string(), "bits32");
        assert_eq!(Type::pointer(Type::bits(8)).to_string(), "ptr[bits8]");
        assert_eq!(Type::control(3).to_string(), "ctl3");
        let fct = Type::Function(FunctionType::new(
            vec![Type::bits(32)],
            vec![Type::bits(32), Type::MemState],
        ));
        assert_eq!(fct.to_string(), "fn(bits32) -> (bits32, mem)");
    }

    #[test]
    fn serde_roundtrip() {
        let ty = Type::Struct {
            fields: vec![Type::bits(8), Type::pointer(Type::Float { size: FloatSize::Double })],
            packed: true,
        };
        let json = serde_json::to_string(&ty).unwrap();
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(ty, back);
    }
}
