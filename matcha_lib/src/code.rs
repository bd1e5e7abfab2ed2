// code.rs --- building programs out of combinators
//
// Combinators take grammar fragments and return immutable instruction
// sequences.  This module has nothing to do with how programs get
// executed as patterns; that is vm.rs territory.

use std::fmt;
use std::sync::Arc;

use matcha_value::{format, Value};

use crate::charset::CharSet;
use crate::vm::Error;

/// A reduction callback.  It receives the parser's user context and the
/// cells captured by the frame being closed, in match order, and produces
/// the single value that replaces them.
pub type Action<C> = Arc<dyn Fn(&mut C, Vec<Value>) -> Result<Value, Error> + Send + Sync>;

/// Wrap a closure as an [`Action`].
pub fn action<C, F>(f: F) -> Action<C>
where
    F: Fn(&mut C, Vec<Value>) -> Result<Value, Error> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The closed set of operations the parsing machine executes.  Branch
/// offsets are in instruction units and relative to the program counter
/// already advanced past the branching instruction.
pub enum Instruction<C> {
    // lexical
    Char(char),
    Charset(CharSet),
    Any,
    Move(isize),

    // data
    Push(Value),

    // rules and capture scopes
    Jsr(String),
    Ret(Option<Action<C>>),
    Call(Action<C>),
    Frame,
    Drop,
    Reduce(Option<Action<C>>),

    // control flow
    Choice(isize),
    Commit(isize),
    Fail,
    End,
}

impl<C> Clone for Instruction<C> {
    fn clone(&self) -> Self {
        match self {
            Instruction::Char(c) => Instruction::Char(*c),
            Instruction::Charset(s) => Instruction::Charset(s.clone()),
            Instruction::Any => Instruction::Any,
            Instruction::Move(d) => Instruction::Move(*d),
            Instruction::Push(v) => Instruction::Push(v.clone()),
            Instruction::Jsr(n) => Instruction::Jsr(n.clone()),
            Instruction::Ret(f) => Instruction::Ret(f.clone()),
            Instruction::Call(f) => Instruction::Call(f.clone()),
            Instruction::Frame => Instruction::Frame,
            Instruction::Drop => Instruction::Drop,
            Instruction::Reduce(f) => Instruction::Reduce(f.clone()),
            Instruction::Choice(o) => Instruction::Choice(*o),
            Instruction::Commit(o) => Instruction::Commit(*o),
            Instruction::Fail => Instruction::Fail,
            Instruction::End => Instruction::End,
        }
    }
}

// Callbacks have no structure to compare; two instructions carrying
// callbacks are equal only when they carry the same one.
fn action_eq<C>(a: &Option<Action<C>>, b: &Option<Action<C>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

impl<C> PartialEq for Instruction<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Instruction::Char(a), Instruction::Char(b)) => a == b,
            (Instruction::Charset(a), Instruction::Charset(b)) => a == b,
            (Instruction::Any, Instruction::Any) => true,
            (Instruction::Move(a), Instruction::Move(b)) => a == b,
            (Instruction::Push(a), Instruction::Push(b)) => a == b,
            (Instruction::Jsr(a), Instruction::Jsr(b)) => a == b,
            (Instruction::Ret(a), Instruction::Ret(b)) => action_eq(a, b),
            (Instruction::Call(a), Instruction::Call(b)) => Arc::ptr_eq(a, b),
            (Instruction::Frame, Instruction::Frame) => true,
            (Instruction::Drop, Instruction::Drop) => true,
            (Instruction::Reduce(a), Instruction::Reduce(b)) => action_eq(a, b),
            (Instruction::Choice(a), Instruction::Choice(b)) => a == b,
            (Instruction::Commit(a), Instruction::Commit(b)) => a == b,
            (Instruction::Fail, Instruction::Fail) => true,
            (Instruction::End, Instruction::End) => true,
            _ => false,
        }
    }
}

impl<C> fmt::Display for Instruction<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Char(c) => write!(f, "char {:?}", c),
            Instruction::Charset(s) => write!(f, "charset {}", s),
            Instruction::Any => write!(f, "any"),
            Instruction::Move(d) => write!(f, "move {}", d),
            Instruction::Push(v) => write!(f, "push {:?}", v),
            Instruction::Jsr(n) => write!(f, "jsr {:?}", n),
            Instruction::Ret(None) => write!(f, "ret"),
            Instruction::Ret(Some(_)) => write!(f, "ret <fn>"),
            Instruction::Call(_) => write!(f, "call <fn>"),
            Instruction::Frame => write!(f, "frame"),
            Instruction::Drop => write!(f, "drop"),
            Instruction::Reduce(None) => write!(f, "reduce"),
            Instruction::Reduce(Some(_)) => write!(f, "reduce <fn>"),
            Instruction::Choice(o) => write!(f, "choice {}", o),
            Instruction::Commit(o) => write!(f, "commit {}", o),
            Instruction::Fail => write!(f, "fail"),
            Instruction::End => write!(f, "end"),
        }
    }
}

impl<C> fmt::Debug for Instruction<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// An immutable instruction sequence.  Cloning a `Code` clones a handle,
/// never the program.
pub struct Code<C = ()> {
    ops: Arc<[Instruction<C>]>,
}

impl<C> Code<C> {
    pub fn empty() -> Self {
        Code::from_ops(vec![])
    }

    pub(crate) fn from_ops(ops: Vec<Instruction<C>>) -> Self {
        Code { ops: ops.into() }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction<C>> {
        self.ops.get(pc)
    }

    pub fn instructions(&self) -> &[Instruction<C>] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction<C>> {
        self.ops.iter()
    }

    /// The stored form of a grammar rule: the program followed by a
    /// returning instruction carrying the rule's callback.
    pub(crate) fn with_ret(&self, action: Option<Action<C>>) -> Code<C> {
        let mut ops: Vec<Instruction<C>> = self.iter().cloned().collect();
        ops.push(Instruction::Ret(action));
        Code::from_ops(ops)
    }
}

impl<C> Clone for Code<C> {
    fn clone(&self) -> Self {
        Code {
            ops: Arc::clone(&self.ops),
        }
    }
}

impl<C> PartialEq for Code<C> {
    fn eq(&self, other: &Self) -> bool {
        self.ops == other.ops
    }
}

impl<C> fmt::Display for Code<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, instruction) in self.iter().enumerate() {
            writeln!(f, "  {:#04} {}", i, instruction)?;
        }
        Ok(())
    }
}

impl<C> fmt::Debug for Code<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.ops)
    }
}

// -- Normalization --------------------------------------------------------
//
// Combinators accept anything convertible into a program: a string is a
// literal, an ordered collection of programs is their concatenation, and
// an already-built Code passes through.

impl<C> From<&str> for Code<C> {
    fn from(s: &str) -> Self {
        literal(s)
    }
}

impl<C> From<String> for Code<C> {
    fn from(s: String) -> Self {
        literal(&s)
    }
}

impl<C> From<char> for Code<C> {
    fn from(c: char) -> Self {
        Code::from_ops(vec![Instruction::Char(c)])
    }
}

impl<C> From<Vec<Code<C>>> for Code<C> {
    fn from(parts: Vec<Code<C>>) -> Self {
        sequence(parts)
    }
}

impl<C, const N: usize> From<[Code<C>; N]> for Code<C> {
    fn from(parts: [Code<C>; N]) -> Self {
        sequence(parts)
    }
}

// -- Combinators ----------------------------------------------------------

/// One `char` instruction per scalar; the empty string is the empty
/// program.
pub fn literal<C>(s: &str) -> Code<C> {
    Code::from_ops(s.chars().map(Instruction::Char).collect())
}

pub fn charset<C>(set: impl Into<CharSet>) -> Code<C> {
    Code::from_ops(vec![Instruction::Charset(set.into())])
}

pub fn any<C>() -> Code<C> {
    Code::from_ops(vec![Instruction::Any])
}

/// Move the input cursor by `delta` scalars without consuming.  Moving
/// before the start of the input fails; moving past the end is allowed
/// and surfaces at the next consuming instruction.
pub fn move_cursor<C>(delta: isize) -> Code<C> {
    Code::from_ops(vec![Instruction::Move(delta)])
}

pub fn sequence<C, P, I>(parts: I) -> Code<C>
where
    P: Into<Code<C>>,
    I: IntoIterator<Item = P>,
{
    let mut ops = Vec::new();
    for part in parts {
        ops.extend(part.into().iter().cloned());
    }
    Code::from_ops(ops)
}

pub use self::sequence as concat;

/// Ordered choice, nested right-associatively: the first alternative to
/// match wins and commits.  A single alternative is itself.
pub fn choice<C, P, I>(alternatives: I) -> Code<C>
where
    P: Into<Code<C>>,
    I: IntoIterator<Item = P>,
{
    let mut alternatives: Vec<Code<C>> = alternatives.into_iter().map(Into::into).collect();
    let last = match alternatives.pop() {
        Some(last) => last,
        None => return Code::empty(),
    };
    alternatives.into_iter().rev().fold(last, |rest, alt| {
        let mut ops = Vec::with_capacity(alt.len() + rest.len() + 2);
        ops.push(Instruction::Choice(alt.len() as isize + 1));
        ops.extend(alt.iter().cloned());
        ops.push(Instruction::Commit(rest.len() as isize));
        ops.extend(rest.iter().cloned());
        Code::from_ops(ops)
    })
}

/// Greedy repetition: the commit jumps back onto the choice instruction,
/// re-arming the backtrack point after every iteration.
pub fn zero_or_more<C>(program: impl Into<Code<C>>) -> Code<C> {
    let program = program.into();
    let len = program.len() as isize;
    let mut ops = Vec::with_capacity(program.len() + 2);
    ops.push(Instruction::Choice(len + 1));
    ops.extend(program.iter().cloned());
    ops.push(Instruction::Commit(-(len + 2)));
    Code::from_ops(ops)
}

pub fn one_or_more<C>(program: impl Into<Code<C>>) -> Code<C> {
    let program = program.into();
    sequence([program.clone(), zero_or_more(program)])
}

/// Match `program`, or push `default` without consuming anything.
pub fn optional<C>(program: impl Into<Code<C>>, default: Value) -> Code<C> {
    let program = program.into();
    let len = program.len() as isize;
    let mut ops = Vec::with_capacity(program.len() + 3);
    ops.push(Instruction::Choice(len + 1));
    ops.extend(program.iter().cloned());
    ops.push(Instruction::Commit(1));
    ops.push(Instruction::Push(default));
    Code::from_ops(ops)
}

pub fn zero_or_one<C>(program: impl Into<Code<C>>) -> Code<C> {
    optional(program, Value::Absent)
}

/// Negative lookahead.  When `program` matches, the commit discards the
/// backtrack point and falls through to an unconditional fail; when it
/// fails, the backtrack leaps past that fail, so the predicate succeeds
/// without consuming input or leaving captures behind.
pub fn not<C>(program: impl Into<Code<C>>) -> Code<C> {
    let program = program.into();
    let len = program.len() as isize;
    let mut ops = Vec::with_capacity(program.len() + 3);
    ops.push(Instruction::Choice(len + 2));
    ops.extend(program.iter().cloned());
    ops.push(Instruction::Commit(0));
    ops.push(Instruction::Fail);
    Code::from_ops(ops)
}

pub fn and<C>(program: impl Into<Code<C>>) -> Code<C> {
    not(not(program.into()))
}

/// Test `program` at a cursor displaced by `delta`; negative deltas look
/// behind.  The whole thing is a predicate: the cursor is untouched.
pub fn lookaround<C>(delta: isize, program: impl Into<Code<C>>) -> Code<C> {
    not(sequence([move_cursor(delta), program.into()]))
}

pub fn rule_ref<C>(name: &str) -> Code<C> {
    Code::from_ops(vec![Instruction::Jsr(name.to_string())])
}

fn scoped<C>(program: Code<C>, close: Instruction<C>) -> Code<C> {
    let mut ops = Vec::with_capacity(program.len() + 2);
    ops.push(Instruction::Frame);
    ops.extend(program.iter().cloned());
    ops.push(close);
    Code::from_ops(ops)
}

/// Match `program` and throw its captures away.
pub fn consume<C>(program: impl Into<Code<C>>) -> Code<C> {
    scoped(program.into(), Instruction::Drop)
}

/// Match `program` and pack its captures into a single list cell.
pub fn capture<C>(program: impl Into<Code<C>>) -> Code<C> {
    scoped(program.into(), Instruction::Reduce(None))
}

/// Match `program` and replace its captures with `action`'s result.
pub fn reduce<C>(program: impl Into<Code<C>>, action: Action<C>) -> Code<C> {
    scoped(program.into(), Instruction::Reduce(Some(action)))
}

/// Match `program` and flatten its captures into one string.
pub fn join<C: 'static>(program: impl Into<Code<C>>) -> Code<C> {
    let flatten: Action<C> = Arc::new(|_context: &mut C, values: Vec<Value>| {
        Ok(Value::Str(values.iter().map(format::value_text).collect()))
    });
    scoped(program.into(), Instruction::Reduce(Some(flatten)))
}

pub fn string<C: 'static>(program: impl Into<Code<C>>) -> Code<C> {
    join(one_or_more(program))
}

/// Match `head` where none of `tails` would match first.
pub fn except<C, H, P, I>(head: H, tails: I) -> Code<C>
where
    H: Into<Code<C>>,
    P: Into<Code<C>>,
    I: IntoIterator<Item = P>,
{
    let mut parts: Vec<Code<C>> = tails.into_iter().map(|t| not(t.into())).collect();
    parts.push(head.into());
    sequence(parts)
}

pub fn any_except<C, P, I>(tails: I) -> Code<C>
where
    P: Into<Code<C>>,
    I: IntoIterator<Item = P>,
{
    except(any(), tails)
}
