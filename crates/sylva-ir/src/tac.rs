//! Three-address code.
//!
//! A [`Tac`] is a tuple of an operation, ordered operand variables, and
//! ordered result variables. Operand and result arities and types must match
//! the operation's signature; violations are programmer errors and assert
//! rather than propagate.
//!
//! [`TacSeq`] is a self-contained TAC sequence with its own local-variable
//! arena. It backs data-node initializers, where no CFG exists to own the
//! temporaries.

use serde::{Deserialize, Serialize};

use crate::ops::Operation;
use crate::types::Type;
use crate::variable::{Globals, Var, VarId, Variable};

/// One three-address instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tac {
    pub operation: Operation,
    pub operands: Vec<Var>,
    pub results: Vec<Var>,
}

impl Tac {
    pub fn new(operation: Operation, operands: Vec<Var>, results: Vec<Var>) -> Self {
        Tac { operation, operands, results }
    }

    /// Asserts that operand/result arities and types agree with the
    /// operation signature. `resolve` maps a variable to its type.
    pub fn check(&self, resolve: impl Fn(Var) -> Type) {
        let args = self.operation.arguments();
        let results = self.operation.results();
        assert_eq!(
            self.operands.len(),
            args.len(),
            "operand arity mismatch for {}",
            self.operation.debug_string()
        );
        assert_eq!(
            self.results.len(),
            results.len(),
            "result arity mismatch for {}",
            self.operation.debug_string()
        );
        for (n, (var, expected)) in self.operands.iter().zip(&args).enumerate() {
            let actual = resolve(*var);
            assert_eq!(
                &actual, expected,
                "operand {} of {} has type {}, expected {}",
                n,
                self.operation.debug_string(),
                actual,
                expected
            );
        }
        for (n, (var, expected)) in self.results.iter().zip(&results).enumerate() {
            let actual = resolve(*var);
            assert_eq!(
                &actual, expected,
                "result {} of {} has type {}, expected {}",
                n,
                self.operation.debug_string(),
                actual,
                expected
            );
        }
    }
}

/// A standalone TAC sequence with its own variable arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TacSeq {
    variables: Vec<Variable>,
    tacs: Vec<Tac>,
}

impl TacSeq {
    pub fn new() -> Self {
        TacSeq::default()
    }

    /// Creates a fresh local variable in the sequence's arena.
    pub fn create_variable(&mut self, ty: Type) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable::local(format!("v{}", id.0), ty));
        id
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    /// Appends a checked TAC. Global operands resolve through `globals`.
    pub fn append(&mut self, tac: Tac, globals: &Globals) {
        tac.check(|var| match var {
            Var::Local(id) => self.variables[id.0 as usize].ty.clone(),
            Var::Global(id) => globals.get(id).expect("unknown global in tac").ty.clone(),
        });
        self.tacs.push(tac);
    }

    pub fn tacs(&self) -> &[Tac] {
        &self.tacs
    }

    pub fn len(&self) -> usize {
        self.tacs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tacs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tacseq_append_checks_types() {
        let globals = Globals::new();
        let mut seq = TacSeq::new();
        let c = seq.create_variable(Type::bits(32));
        seq.append(
            Tac::new(Operation::bitconst(32, 42), vec![], vec![Var::Local(c)]),
            &globals,
        );
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.variable(c).ty, Type::bits(32));
    }

    #[test]
    #[should_panic(expected = "operand arity mismatch")]
    fn wrong_arity_panics() {
        let globals = Globals::new();
        let mut seq = TacSeq::new();
        let a = seq.create_variable(Type::bits(32));
        let r = seq.create_variable(Type::bits(32));
        // bitadd takes two operands.
        seq.append(
            Tac::new(Operation::bitadd(32), vec![Var::Local(a)], vec![Var::Local(r)]),
            &globals,
        );
    }

    #[test]
    #[should_panic(expected = "expected bits32")]
    fn wrong_type_panics() {
        let globals = Globals::new();
        let mut seq = TacSeq::new();
        let a = seq.create_variable(Type::bits(32));
        let b = seq.create_variable(Type::bits(64));
        let r = seq.create_variable(Type::bits(32));
        seq.append(
            Tac::new(
                Operation::bitadd(32),
                vec![Var::Local(a), Var::Local(b)],
                vec![Var::Local(r)],
            ),
            &globals,
        );
    }
}
