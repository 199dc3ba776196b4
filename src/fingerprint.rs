//! Canonical textual rendering of queries, used both as the oracle query
//! text and as the cache key / cached-value encoding.
//!
//! SPEC_FULL treats the "real" fingerprint printer, its parser, and the
//! query serializer (`BuildQuery`) as external collaborators that this
//! crate cannot omit without losing the seam entirely. This module is the
//! internal stand-in: any textual form satisfying "two queries identical
//! up to node identity yield equal fingerprints" is conformant, and this
//! one is not meant to match any other tool's syntax.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::apint::ApInt;
use crate::error::SolverError;
use crate::ic::{InstContext, InstRef, Kind, Payload};
use crate::pc::{Bpcs, Mapping, Pcs};

fn render(node: &InstRef, out: &mut String) {
    match &node.payload {
        Payload::Var { name, .. } => {
            let _ = write!(out, "{name}:i{}", node.width);
        }
        Payload::Const(v) | Payload::UntypedConst(v) => {
            let _ = write!(out, "{v}");
        }
        Payload::Phi(block) => {
            let _ = write!(out, "(Phi %{}", block.id);
            for op in &node.operands {
                out.push(' ');
                render(op, out);
            }
            out.push(')');
        }
        Payload::ExtractValue(idx) => {
            out.push_str("(ExtractValue ");
            render(&node.operands[0], out);
            let _ = write!(out, " {idx})");
        }
        Payload::None => {
            let _ = write!(out, "({:?}", node.kind);
            for op in &node.operands {
                out.push(' ');
                render(op, out);
            }
            out.push(')');
        }
    }
}

/// Render a single node as RHS text, suitable for `parse_replacement_rhs`.
pub fn print_rhs(node: &InstRef) -> String {
    let mut s = String::new();
    render(node, &mut s);
    s
}

/// The canonical fingerprint of `(BPCs, PCs, LHS)`. Structurally-identical
/// inputs (same interned nodes, same ordering) always yield the same
/// string; this is the entire cache-coherence contract (SPEC_FULL §8,
/// property 5).
pub fn fingerprint(bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> String {
    let mut s = String::new();
    s.push_str("BPCS[");
    for bpc in bpcs {
        let _ = write!(s, "%{}:{}=(", bpc.block.id, bpc.predecessor);
        render(&bpc.condition.lhs, &mut s);
        s.push(',');
        render(&bpc.condition.rhs, &mut s);
        s.push_str(");");
    }
    s.push_str("]PCS[");
    for pc in pcs {
        render(&pc.lhs, &mut s);
        s.push('=');
        render(&pc.rhs, &mut s);
        s.push(';');
    }
    s.push_str("]LHS[");
    render(lhs, &mut s);
    s.push(']');
    s
}

/// The canonical fingerprint of a `Mapping`, used by the in-process
/// `isvalid_cache` (SPEC_FULL §4.6).
pub fn mapping_fingerprint(mapping: &Mapping) -> String {
    let mut s = String::new();
    s.push_str("MAP[");
    render(&mapping.lhs, &mut s);
    s.push_str("->");
    render(&mapping.rhs, &mut s);
    s.push(']');
    s
}

/// Parse RHS text produced by `print_rhs` back into a live interned node.
/// `vars` must already contain every variable referenced by name (the
/// caller always has these, since it is reconstituting a rewrite of an
/// LHS it already holds). Returns `ProtocolError` on any malformed input,
/// per SPEC_FULL §7 (a cached value that fails to parse back is a protocol
/// error, not a panic).
pub fn parse_replacement_rhs(
    ic: &InstContext,
    text: &str,
    vars: &HashMap<String, InstRef>,
) -> Result<InstRef, SolverError> {
    let mut chars = text.chars().peekable();
    let node = parse_expr(ic, &mut chars, vars)?;
    skip_ws(&mut chars);
    if chars.next().is_some() {
        return Err(SolverError::ProtocolError(format!(
            "trailing garbage after RHS: {text}"
        )));
    }
    Ok(node)
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

fn parse_atom(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if c == '(' || c == ')' || c.is_whitespace() {
            break;
        }
        s.push(c);
        chars.next();
    }
    s
}

fn parse_leaf(
    ic: &InstContext,
    atom: &str,
    vars: &HashMap<String, InstRef>,
) -> Result<InstRef, SolverError> {
    let (value_part, width_part) = atom
        .rsplit_once(":i")
        .ok_or_else(|| SolverError::ProtocolError(format!("malformed leaf: {atom}")))?;
    let width: u32 = width_part
        .parse()
        .map_err(|_| SolverError::ProtocolError(format!("malformed width in leaf: {atom}")))?;
    if let Some(hex) = value_part.strip_prefix("0x") {
        let value = u64::from_str_radix(hex, 16)
            .map_err(|_| SolverError::ProtocolError(format!("malformed constant: {atom}")))?;
        return Ok(ic.const_u64(width, value));
    }
    vars.get(value_part)
        .cloned()
        .ok_or_else(|| SolverError::ProtocolError(format!("unknown variable: {value_part}")))
}

fn parse_expr(
    ic: &InstContext,
    chars: &mut std::iter::Peekable<std::str::Chars>,
    vars: &HashMap<String, InstRef>,
) -> Result<InstRef, SolverError> {
    skip_ws(chars);
    match chars.peek() {
        Some('(') => {
            chars.next();
            skip_ws(chars);
            let head = parse_atom(chars);
            let kind = kind_from_str(&head)
                .ok_or_else(|| SolverError::ProtocolError(format!("unknown opcode: {head}")))?;
            let mut operands = Vec::new();
            loop {
                skip_ws(chars);
                match chars.peek() {
                    Some(')') => {
                        chars.next();
                        break;
                    }
                    Some(_) => operands.push(parse_expr(ic, chars, vars)?),
                    None => {
                        return Err(SolverError::ProtocolError("unterminated expression".into()))
                    }
                }
            }
            build_from_parts(ic, kind, operands)
        }
        Some(_) => {
            let atom = parse_atom(chars);
            parse_leaf(ic, &atom, vars)
        }
        None => Err(SolverError::ProtocolError("empty expression".into())),
    }
}

fn kind_from_str(s: &str) -> Option<Kind> {
    Some(match s {
        "Add" => Kind::Add,
        "Sub" => Kind::Sub,
        "Mul" => Kind::Mul,
        "UDiv" => Kind::UDiv,
        "SDiv" => Kind::SDiv,
        "URem" => Kind::URem,
        "SRem" => Kind::SRem,
        "And" => Kind::And,
        "Or" => Kind::Or,
        "Xor" => Kind::Xor,
        "Shl" => Kind::Shl,
        "LShr" => Kind::LShr,
        "AShr" => Kind::AShr,
        "Select" => Kind::Select,
        "ZExt" => Kind::ZExt,
        "SExt" => Kind::SExt,
        "Trunc" => Kind::Trunc,
        "Eq" => Kind::Eq,
        "Ne" => Kind::Ne,
        "Ult" => Kind::Ult,
        "Ule" => Kind::Ule,
        "Slt" => Kind::Slt,
        "Sle" => Kind::Sle,
        "UAddWithOverflow" => Kind::UAddWithOverflow,
        "UAddO" => Kind::UAddO,
        _ => return None,
    })
}

/// Rebuild a node from an opcode and already-parsed operands. Width is
/// inferred structurally: same-width ops carry their operand width,
/// predicates are width 1. `ExtractValue`/`Phi` are not reachable here —
/// they print through their own branch in `render` (`(Phi ...)` /
/// `(ExtractValue ...)`), which this function also accepts syntactically
/// but rejects with a protocol error if the arity doesn't fit, since an
/// RHS produced by `infer` never legitimately contains a fresh `Phi` or
/// `ExtractValue` (those are copied structurally from the LHS instead, see
/// `rewriter::copy_with_substitution`).
fn build_from_parts(ic: &InstContext, kind: Kind, operands: Vec<InstRef>) -> Result<InstRef, SolverError> {
    if matches!(kind, Kind::Phi) {
        return Err(SolverError::ProtocolError(
            "a synthesized RHS cannot introduce a fresh Phi".into(),
        ));
    }
    let width = if kind.is_predicate() {
        1
    } else {
        operands
            .first()
            .map(|o| o.width)
            .ok_or_else(|| SolverError::ProtocolError("opcode with no operands".into()))?
    };
    Ok(ic.op(kind, width, operands))
}

/// Needed so `render`/leaf parsing agree on hex rendering for constants
/// regardless of which limb count `ApInt` chose internally.
pub fn const_text(v: &ApInt) -> String {
    format!("{v}")
}
