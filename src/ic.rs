//! The interned expression DAG: opcodes, nodes, blocks, and the hash-consing
//! context that owns them.
//!
//! Nodes are immutable once interned and structurally identical nodes share
//! identity (`Rc` pointer equality), per the Design Notes in SPEC_FULL §9.
//! `InstContext` is the arena: every node a rewriter produces is interned
//! through it, so "the same expression" always means "the same `Rc`".

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::apint::ApInt;

/// Opcode tags for the IR. See SPEC_FULL §3 for the rationale behind the
/// exact set kept here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Var,
    Const,
    UntypedConst,
    Phi,
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Select,
    ZExt,
    SExt,
    Trunc,
    Eq,
    Ne,
    Ult,
    Ule,
    Slt,
    Sle,
    ExtractValue,
    UAddWithOverflow,
    UAddO,
}

impl Kind {
    /// Opcodes whose result is always a width-1 predicate.
    pub fn is_predicate(self) -> bool {
        matches!(
            self,
            Kind::Eq | Kind::Ne | Kind::Ult | Kind::Ule | Kind::Slt | Kind::Sle | Kind::UAddO
        )
    }
}

/// A basic-block descriptor referenced by `Phi` nodes and by block-path
/// conditions. Identity is by `id`; `preds` is the count of predecessors
/// (the rewriter never needs more than arity to rebuild a `Phi`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    pub id: u32,
    pub preds: usize,
}

pub type BlockRef = Rc<Block>;

/// Marker distinguishing an LHS harvested verbatim from a program's use of a
/// value (restricted semantics) from a normally-constructed LHS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestKind {
    Normal,
    HarvestedFromUse,
}

/// Per-node payload that doesn't fit the common `(kind, width, operands)`
/// shape.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Var {
        name: String,
        demanded_bits: ApInt,
    },
    Const(ApInt),
    UntypedConst(ApInt),
    Phi(BlockRef),
    ExtractValue(usize),
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::None, Payload::None) => true,
            (Payload::Var { name: n1, .. }, Payload::Var { name: n2, .. }) => n1 == n2,
            (Payload::Const(a), Payload::Const(b)) => a == b,
            (Payload::UntypedConst(a), Payload::UntypedConst(b)) => a == b,
            (Payload::Phi(a), Payload::Phi(b)) => a == b,
            (Payload::ExtractValue(a), Payload::ExtractValue(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Payload {}

/// A node in the interned expression DAG.
#[derive(Debug)]
pub struct Inst {
    pub kind: Kind,
    pub width: u32,
    pub operands: Vec<InstRef>,
    pub payload: Payload,
    /// Only meaningful on LHS roots; `Normal` everywhere else.
    pub harvest_kind: HarvestKind,
}

pub type InstRef = Rc<Inst>;

impl PartialEq for Inst {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.width == other.width
            && self.payload == other.payload
            && self.operands.len() == other.operands.len()
            && self
                .operands
                .iter()
                .zip(other.operands.iter())
                .all(|(a, b)| Rc::ptr_eq(a, b))
    }
}
impl Eq for Inst {}

impl std::hash::Hash for Inst {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.width.hash(state);
        for op in &self.operands {
            (Rc::as_ptr(op) as usize).hash(state);
        }
        match &self.payload {
            Payload::None => {}
            Payload::Var { name, .. } => name.hash(state),
            Payload::Const(v) | Payload::UntypedConst(v) => v.hash(state),
            Payload::Phi(b) => b.hash(state),
            Payload::ExtractValue(i) => i.hash(state),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Var { name, .. } => write!(f, "{name}:i{}", self.width),
            Payload::Const(v) | Payload::UntypedConst(v) => write!(f, "{}", v),
            _ => {
                write!(f, "({:?}", self.kind)?;
                for op in &self.operands {
                    write!(f, " {op}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Hash-consing arena. Every constructed node passes through `intern`, so
/// two structurally-identical nodes are always the same `Rc`.
#[derive(Default)]
pub struct InstContext {
    table: RefCell<HashMap<InstKey, InstRef>>,
    next_block_id: RefCell<u32>,
}

/// A hashable/equatable projection of an about-to-be-interned `Inst`, used
/// only as the hash-cons map key (the map itself owns the canonical `Inst`).
#[derive(PartialEq, Eq, Hash)]
struct InstKey {
    kind: Kind,
    width: u32,
    operand_ptrs: Vec<usize>,
    payload_bits: PayloadKey,
}

#[derive(PartialEq, Eq, Hash)]
enum PayloadKey {
    None,
    Var(String, ApInt),
    Const(ApInt),
    Phi(u32),
    ExtractValue(usize),
}

fn payload_key(p: &Payload) -> PayloadKey {
    match p {
        Payload::None => PayloadKey::None,
        Payload::Var { name, demanded_bits } => PayloadKey::Var(name.clone(), demanded_bits.clone()),
        Payload::Const(v) | Payload::UntypedConst(v) => PayloadKey::Const(v.clone()),
        Payload::Phi(b) => PayloadKey::Phi(b.id),
        Payload::ExtractValue(i) => PayloadKey::ExtractValue(*i),
    }
}

impl InstContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, inst: Inst) -> InstRef {
        let key = InstKey {
            kind: inst.kind,
            width: inst.width,
            operand_ptrs: inst.operands.iter().map(|o| Rc::as_ptr(o) as usize).collect(),
            payload_bits: payload_key(&inst.payload),
        };
        let mut table = self.table.borrow_mut();
        if let Some(existing) = table.get(&key) {
            return existing.clone();
        }
        let rc = Rc::new(inst);
        table.insert(key, rc.clone());
        rc
    }

    /// Intern a fresh, uniquely-numbered block (for `Phi` nodes).
    pub fn new_block(&self, preds: usize) -> BlockRef {
        let mut id = self.next_block_id.borrow_mut();
        let block = Rc::new(Block { id: *id, preds });
        *id += 1;
        block
    }

    pub fn var(&self, name: impl Into<String>, width: u32) -> InstRef {
        let name = name.into();
        self.intern(Inst {
            kind: Kind::Var,
            width,
            operands: vec![],
            payload: Payload::Var {
                name,
                demanded_bits: ApInt::all_ones(width),
            },
            harvest_kind: HarvestKind::Normal,
        })
    }

    pub fn var_with_demanded_bits(
        &self,
        name: impl Into<String>,
        width: u32,
        demanded_bits: ApInt,
    ) -> InstRef {
        self.intern(Inst {
            kind: Kind::Var,
            width,
            operands: vec![],
            payload: Payload::Var {
                name: name.into(),
                demanded_bits,
            },
            harvest_kind: HarvestKind::Normal,
        })
    }

    pub fn constant(&self, value: ApInt) -> InstRef {
        let width = value.width();
        self.intern(Inst {
            kind: Kind::Const,
            width,
            operands: vec![],
            payload: Payload::Const(value),
            harvest_kind: HarvestKind::Normal,
        })
    }

    pub fn const_u64(&self, width: u32, value: u64) -> InstRef {
        self.constant(ApInt::from_u64(width, value))
    }

    pub fn const_i64(&self, width: u32, value: i64) -> InstRef {
        self.constant(ApInt::from_i64(width, value))
    }

    pub fn phi(&self, width: u32, block: BlockRef, incoming: Vec<InstRef>) -> InstRef {
        assert_eq!(incoming.len(), block.preds, "phi arity must match block predecessor count");
        self.intern(Inst {
            kind: Kind::Phi,
            width,
            operands: incoming,
            payload: Payload::Phi(block),
            harvest_kind: HarvestKind::Normal,
        })
    }

    /// Build a binary or n-ary opcode node of the given result width.
    pub fn op(&self, kind: Kind, width: u32, operands: Vec<InstRef>) -> InstRef {
        debug_assert!(!kind.is_predicate() || width == 1, "predicate opcodes must have width 1");
        self.intern(Inst {
            kind,
            width,
            operands,
            payload: Payload::None,
            harvest_kind: HarvestKind::Normal,
        })
    }

    /// `ExtractValue(aggregate, index)`.
    pub fn extract_value(&self, width: u32, aggregate: InstRef, index: usize) -> InstRef {
        self.intern(Inst {
            kind: Kind::ExtractValue,
            width,
            operands: vec![aggregate],
            payload: Payload::ExtractValue(index),
            harvest_kind: HarvestKind::Normal,
        })
    }

    /// Mark a node as an LHS harvested from a program use (restricted
    /// semantics). Harvested roots are never shared with non-harvested
    /// roots of identical shape, so this re-interns under a distinct key
    /// by simply not going through the shared table.
    pub fn as_harvested_from_use(&self, inst: &InstRef) -> InstRef {
        Rc::new(Inst {
            kind: inst.kind,
            width: inst.width,
            operands: inst.operands.clone(),
            payload: inst.payload.clone(),
            harvest_kind: HarvestKind::HarvestedFromUse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_identical_nodes_share_identity() {
        let ic = InstContext::new();
        let x1 = ic.var("x", 8);
        let x2 = ic.var("x", 8);
        assert!(Rc::ptr_eq(&x1, &x2));

        let a = ic.const_u64(8, 0);
        let n1 = ic.op(Kind::And, 8, vec![x1.clone(), a.clone()]);
        let n2 = ic.op(Kind::And, 8, vec![x2.clone(), a.clone()]);
        assert!(Rc::ptr_eq(&n1, &n2));
    }

    #[test]
    fn distinct_variables_are_distinct_nodes() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let y = ic.var("y", 8);
        assert!(!Rc::ptr_eq(&x, &y));
    }

    #[test]
    fn phi_requires_matching_arity() {
        let ic = InstContext::new();
        let block = ic.new_block(2);
        let a = ic.const_u64(8, 1);
        let b = ic.const_u64(8, 2);
        let phi = ic.phi(8, block, vec![a, b]);
        assert_eq!(phi.operands.len(), 2);
    }

    #[test]
    fn display_renders_sexpr() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let zero = ic.const_u64(8, 0);
        let node = ic.op(Kind::And, 8, vec![x, zero]);
        assert_eq!(format!("{node}"), "(And x:i8 0x0:i8)");
    }
}
