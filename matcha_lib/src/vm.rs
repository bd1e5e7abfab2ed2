// vm.rs --- parsing machine
//
// This machine matches patterns in strings.  The patterns themselves are
// built out of combinators and get compiled to programs that can be
// executed by this machine.  This module has nothing to do with how
// patterns get compiled to programs, but how programs get executed as
// patterns: one instruction per step, a data stack shared between
// captures and rule bookkeeping, and a chain of backtrack points that
// the fail instruction unwinds.

use std::fmt;

use log::{debug, trace};

use matcha_value::Value;

use crate::code::{Action, Code, Instruction};
use crate::grammar::Grammar;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    // A jsr named a rule the grammar never defined
    RuleNotFound(String),
    // The machine read a cell or address that cannot be there
    Index,
    // A reduction callback refused its input
    Action(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::RuleNotFound(name) => write!(f, "rule not found: {:?}", name),
            Error::Index => write!(f, "malformed program or stack"),
            Error::Action(msg) => write!(f, "reduction callback failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Terminal state of a parse.  Match failure is a status, never an
/// [`Error`]; the cursor is left at the position where backtracking
/// exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Pending,
    Success,
    Failure,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Pending => Ok(()),
            Status::Success => write!(f, "success"),
            Status::Failure => write!(f, "failure"),
        }
    }
}

// Stack cells mix captured values with the bookkeeping a rule call
// saves.  A rule's captures live strictly above the three bookkeeping
// cells its jsr pushed; ret unwinds both in one pass.
enum Cell<C> {
    Value(Value),
    SavedPc(usize),
    SavedCode(Code<C>),
    SavedFp(usize),
}

// Snapshot that the fail instruction restores: where to resume and how
// much machine state to roll back.
struct Backtrack<C> {
    prev: Option<Box<Backtrack<C>>>,
    pc: usize,
    code: Code<C>,
    cursor: usize,
    sp: usize,
    fp: usize,
}

pub struct Parser<'g, C = ()> {
    grammar: &'g Grammar<C>,
    // `jsr start; end`, what code is reset to on restart
    boot: Code<C>,
    code: Code<C>,
    pc: usize,
    input: Vec<char>,
    cursor: usize,
    stack: Vec<Cell<C>>,
    fp: usize,
    bp: Option<Box<Backtrack<C>>>,
    running: bool,
    status: Status,
    clock: u64,
    context: C,
}

impl<'g, C> Parser<'g, C> {
    pub fn new(grammar: &'g Grammar<C>, start: &str, context: C) -> Self {
        let boot = Code::from_ops(vec![
            Instruction::Jsr(start.to_string()),
            Instruction::End,
        ]);
        Parser {
            grammar,
            code: boot.clone(),
            boot,
            pc: 0,
            input: vec![],
            cursor: 0,
            stack: vec![],
            fp: 0,
            bp: None,
            running: true,
            status: Status::Pending,
            clock: 0,
            context,
        }
    }

    // -- observable state -------------------------------------------------

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// The value of a successful parse: the single cell the start rule
    /// left on the stack.
    pub fn result(&self) -> Option<Value> {
        if self.status != Status::Success {
            return None;
        }
        match self.stack.first() {
            Some(Cell::Value(v)) => Some(v.clone()),
            _ => None,
        }
    }

    // -- driving ----------------------------------------------------------

    /// Execute one instruction: fetch, advance, dispatch.
    pub fn step(&mut self) -> Result<(), Error> {
        let code = self.code.clone();
        let instruction = code.get(self.pc).ok_or(Error::Index)?;
        trace!("{:#04} {:#04} {}", self.pc, self.cursor, instruction);
        self.pc += 1;
        self.clock += 1;
        match instruction {
            Instruction::Char(expected) => match self.input.get(self.cursor) {
                Some(&c) if c == *expected => self.consume_scalar(c),
                _ => self.fail(),
            },
            Instruction::Charset(set) => match self.input.get(self.cursor) {
                Some(&c) if set.contains(c) => self.consume_scalar(c),
                _ => self.fail(),
            },
            // the null scalar is reserved as a terminator marker and
            // never matches
            Instruction::Any => match self.input.get(self.cursor) {
                Some(&c) if c != '\0' => self.consume_scalar(c),
                _ => self.fail(),
            },
            Instruction::Move(delta) => {
                let target = self.cursor as isize + delta;
                if target < 0 {
                    self.fail();
                } else {
                    // moving past the end is allowed; the next consuming
                    // instruction will fail there
                    self.cursor = target as usize;
                }
            }
            Instruction::Push(value) => self.stack.push(Cell::Value(value.clone())),
            Instruction::Jsr(name) => {
                self.stack.push(Cell::SavedPc(self.pc));
                self.stack.push(Cell::SavedCode(self.code.clone()));
                self.stack.push(Cell::SavedFp(self.fp));
                self.fp = self.stack.len();
                self.code = self.grammar.get(name)?.clone();
                self.pc = 0;
            }
            Instruction::Ret(action) => {
                let action = action.clone();
                let values = self.collect_frame()?;
                self.fp = self.pop_saved_fp()?;
                self.code = match self.stack.pop() {
                    Some(Cell::SavedCode(code)) => code,
                    _ => return Err(Error::Index),
                };
                self.pc = match self.stack.pop() {
                    Some(Cell::SavedPc(pc)) => pc,
                    _ => return Err(Error::Index),
                };
                let value = self.apply(action, values)?;
                self.stack.push(Cell::Value(value));
            }
            Instruction::Call(action) => {
                let action = action.clone();
                let values = self.collect_frame()?;
                self.fp = self.pop_saved_fp()?;
                let value = action(&mut self.context, values)?;
                self.stack.push(Cell::Value(value));
            }
            Instruction::Frame => {
                self.stack.push(Cell::SavedFp(self.fp));
                self.fp = self.stack.len();
            }
            Instruction::Drop => {
                if self.fp > self.stack.len() {
                    return Err(Error::Index);
                }
                self.stack.truncate(self.fp);
                self.fp = self.pop_saved_fp()?;
            }
            Instruction::Reduce(action) => {
                let action = action.clone();
                let values = self.collect_frame()?;
                self.fp = self.pop_saved_fp()?;
                let value = self.apply(action, values)?;
                self.stack.push(Cell::Value(value));
            }
            Instruction::Choice(offset) => {
                let target = (self.pc as isize + offset) as usize;
                self.bp = Some(Box::new(Backtrack {
                    prev: self.bp.take(),
                    pc: target,
                    code: self.code.clone(),
                    cursor: self.cursor,
                    sp: self.stack.len(),
                    fp: self.fp,
                }));
            }
            Instruction::Commit(offset) => {
                match self.bp.take() {
                    Some(record) => self.bp = record.prev,
                    None => return Err(Error::Index),
                }
                self.pc = (self.pc as isize + offset) as usize;
            }
            Instruction::Fail => self.fail(),
            Instruction::End => {
                self.running = false;
                self.status = Status::Success;
                debug!("halt success @{:#04}", self.cursor);
            }
        }
        Ok(())
    }

    /// Append `more` to the input and step while there is unread input
    /// left.  The machine naturally suspends once the buffer is
    /// exhausted, so input can be fed in as many chunks as it arrives.
    pub fn accept(&mut self, more: &str) -> Result<(), Error> {
        self.input.extend(more.chars());
        while self.running && self.cursor < self.input.len() {
            self.step()?;
        }
        Ok(())
    }

    /// Drive the machine to a halt.  Call after the last chunk of input
    /// has been accepted.
    pub fn run(&mut self) -> Result<(), Error> {
        while self.running {
            self.step()?;
        }
        Ok(())
    }

    /// Accept `input`, run to a halt, and hand back the result, if any.
    pub fn parse(&mut self, input: &str) -> Result<Option<Value>, Error> {
        self.accept(input)?;
        self.run()?;
        Ok(self.result())
    }

    /// Reset the machine without resetting the cursor, so the next run
    /// picks up where the previous match left the input.  Returns
    /// whether unread input remains.
    pub fn restart(&mut self) -> bool {
        self.code = self.boot.clone();
        self.pc = 0;
        self.stack.clear();
        self.fp = 0;
        self.release_backtracks();
        self.running = true;
        self.status = Status::Pending;
        self.cursor < self.input.len()
    }

    /// Advance the cursor past input no rule is expected to match.
    pub fn skip(&mut self, n: usize) {
        self.cursor += n;
    }

    /// Successive matches of the start rule over the remaining input,
    /// skipping one scalar after every failed attempt.
    pub fn match_all(&mut self) -> Matches<'_, 'g, C> {
        Matches { parser: self }
    }

    // -- internals --------------------------------------------------------

    fn consume_scalar(&mut self, c: char) {
        self.stack.push(Cell::Value(Value::Char(c)));
        self.cursor += 1;
    }

    fn fail(&mut self) {
        match self.bp.take() {
            Some(record) => {
                let record = *record;
                self.pc = record.pc;
                self.code = record.code;
                self.cursor = record.cursor;
                self.stack.truncate(record.sp);
                self.fp = record.fp;
                self.bp = record.prev;
            }
            None => {
                self.running = false;
                self.status = Status::Failure;
                debug!("halt failure @{:#04}", self.cursor);
            }
        }
    }

    fn collect_frame(&mut self) -> Result<Vec<Value>, Error> {
        if self.fp > self.stack.len() {
            return Err(Error::Index);
        }
        self.stack
            .split_off(self.fp)
            .into_iter()
            .map(|cell| match cell {
                Cell::Value(v) => Ok(v),
                _ => Err(Error::Index),
            })
            .collect()
    }

    fn pop_saved_fp(&mut self) -> Result<usize, Error> {
        match self.stack.pop() {
            Some(Cell::SavedFp(fp)) => Ok(fp),
            _ => Err(Error::Index),
        }
    }

    fn apply(&mut self, action: Option<Action<C>>, values: Vec<Value>) -> Result<Value, Error> {
        match action {
            Some(f) => f(&mut self.context, values),
            None => Ok(Value::List(values)),
        }
    }

    // unlink the chain iteratively so deep backtracks never recurse on
    // release
    fn release_backtracks(&mut self) {
        let mut bp = self.bp.take();
        while let Some(mut record) = bp {
            bp = record.prev.take();
        }
    }
}

impl<C> Drop for Parser<'_, C> {
    fn drop(&mut self) {
        self.release_backtracks();
    }
}

/// Lazy producer of the values yielded by [`Parser::match_all`].  Rule
/// lookup and callback errors surface as `Err` items.
pub struct Matches<'p, 'g, C> {
    parser: &'p mut Parser<'g, C>,
}

impl<C> Iterator for Matches<'_, '_, C> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(e) = self.parser.run() {
                return Some(Err(e));
            }
            match self.parser.status {
                Status::Success => {
                    let value = self.parser.result();
                    self.parser.restart();
                    return value.map(Ok);
                }
                Status::Failure => {
                    if self.parser.cursor < self.parser.input.len() {
                        self.parser.skip(1);
                        self.parser.restart();
                        continue;
                    }
                    return None;
                }
                Status::Pending => return None,
            }
        }
    }
}
