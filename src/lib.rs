//! Epsilon-NFA construction and matching for a tiny regular-expression
//! dialect.
//!
//! Patterns are compiled Thompson-style: a recursive-descent parser walks
//! the pattern once and builds small automaton *fragments* for every
//! subexpression, splicing them together in place as it goes.  The result
//! is an NFA with epsilon transitions, never determinized or minimized.
//!
//! # Dialect
//!
//! ```text
//! a        literal byte (anything that is not an operator)
//! .        wildcard: any single byte
//! (E1..En) concatenation; only the top level concatenates implicitly
//! [E1..En] union: each Ei is one alternative
//! E*       Kleene closure; stacks, `a**` is closure-of-closure
//! ```
//!
//! # Architecture
//!
//! ```text
//! pattern ──build──> Automaton ──┬─> Backtracker  (depth-first, budgeted)
//!                                └─> Simulation   (breadth-first, pebbles)
//! ```
//!
//! The two matchers decide the same language but survive epsilon cycles in
//! different ways:
//!
//! - [`Backtracker`] recurses over epsilon moves first and labeled moves
//!   second.  Every epsilon-exploration level consumes one unit of a
//!   caller-supplied *budget*; a branch that runs out of budget is rejected.
//!   This guarantees termination on epsilon-cyclic automata at the price of
//!   completeness: an input that needs a longer epsilon chain than the
//!   budget allows is rejected.  [`Backtracker::budget_exhausted`] reports
//!   when that happened.
//! - [`Simulation`] moves a set of *pebbles* (active states) over the input
//!   one byte at a time.  The epsilon closure is computed with a
//!   mark-and-visit discipline, so every state is visited at most once per
//!   step regardless of cycles.
//!
//! ## Fragments
//!
//! Every state belongs to a circular doubly-linked *membership ring*
//! stored as sibling indices in the arena.  A fragment is named by one of
//! its states (its *representative*), and merging two fragments is an O(1)
//! relink of the two rings.  The ring says
//! nothing about reachability; it only lets composition find "every state
//! of this subexpression that is currently final".
//!
//! ## Closure markers
//!
//! A closure node is final and flagged as a closure marker.  When another
//! closure is layered directly on top (`a**`), final closure markers are
//! skipped when wiring the "back to the loop" epsilon edges.  Without that
//! exclusion the inner and outer closure nodes would point at each other
//! and form an epsilon cycle.
//!
//! Cycles can still appear through other constructs: `()*` loops between
//! the empty group and its closure node without consuming input.

use std::fmt;
use std::io::{self, Write};
use std::ops::{Index, IndexMut};

use indexmap::IndexSet;
use log::{Level, debug, log_enabled, trace};

/// Default recursion budget for the [`Backtracker`].
///
/// Every epsilon edge on the current path holds one unit until the path
/// unwinds, and a plain concatenation of `n` literals already chains `n`
/// epsilon edges.  With this budget alone, literals of 43 bytes or more
/// are rejected by the backtracker.  [`Automaton::default_budget`] raises
/// the budget to the state count, which is enough for any closure-free
/// pattern.
pub const DEFAULT_BUDGET: usize = 43;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error returned when a pattern cannot be compiled.
///
/// Offsets are byte offsets into the pattern.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A `[` with no matching `]`.  `pos` is the offset of the `[`.
    #[error("pattern is not balanced: `[` at offset {pos} has no closing `]`")]
    UnbalancedUnion { pos: usize },
    /// A `(` with no matching `)`.  `pos` is the offset of the `(`.
    #[error("pattern is not balanced: `(` at offset {pos} has no closing `)`")]
    UnbalancedConcat { pos: usize },
    /// A `*` with nothing before it to repeat.
    #[error("unexpected `*` at offset {pos}: nothing to repeat")]
    UnexpectedClosure { pos: usize },
    /// A `)` or `]` where a subexpression was expected.
    #[error("pattern is not balanced: unexpected `{token}` at offset {pos}")]
    UnexpectedCloseToken { pos: usize, token: char },
}

// ---------------------------------------------------------------------------
// Labels and transitions
// ---------------------------------------------------------------------------

/// The label on a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    /// Consume exactly this byte.
    Byte(u8),
    /// Consume any single byte (`.`).
    Any,
    /// Consume nothing.
    Epsilon,
}

impl Label {
    /// Whether this label lets the automaton consume `b`.
    #[inline]
    pub fn accepts(self, b: u8) -> bool {
        match self {
            Label::Byte(byte) => byte == b,
            Label::Any => true,
            Label::Epsilon => false,
        }
    }

    #[inline]
    pub fn is_epsilon(self) -> bool {
        self == Label::Epsilon
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Byte(b) => write!(f, "{}", b.escape_ascii()),
            Label::Any => write!(f, "."),
            Label::Epsilon => write!(f, "ε"),
        }
    }
}

/// An outgoing edge of a [`State`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub label: Label,
    pub to: StateIdx,
}

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Index into the state arena.  Doubles as the state's unique id: ids are
/// handed out in creation order, starting with the entry state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateIdx(u32);

impl StateIdx {
    /// The entry state of every compiled [`Automaton`].
    pub const ENTRY: Self = Self(0);

    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }

    /// The numeric id of this state.
    #[inline]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StateIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Typed access to the state arena: `states[state_idx]`.
impl Index<StateIdx> for [State] {
    type Output = State;

    #[inline]
    fn index(&self, idx: StateIdx) -> &State {
        &self[idx.idx()]
    }
}

impl IndexMut<StateIdx> for [State] {
    #[inline]
    fn index_mut(&mut self, idx: StateIdx) -> &mut State {
        &mut self[idx.idx()]
    }
}

/// A single automaton state.
///
/// Matcher bookkeeping (which states currently hold a pebble) is *not*
/// stored here; see [`SimulationMemory`].
#[derive(Clone, Debug)]
pub struct State {
    /// Pattern byte that produced this state.  Informational only.
    ch: u8,
    is_start: bool,
    is_final: bool,
    /// Set on nodes synthesized by a closure.
    closure: bool,
    /// Set once the state gets an outgoing epsilon transition.
    epsilon_source: bool,
    /// Membership ring links.
    next: StateIdx,
    prev: StateIdx,
    transitions: Vec<Transition>,
}

impl State {
    fn new(idx: StateIdx, ch: u8) -> Self {
        Self {
            ch,
            is_start: false,
            is_final: false,
            closure: false,
            epsilon_source: false,
            next: idx,
            prev: idx,
            transitions: Vec::new(),
        }
    }

    /// The pattern byte this state was created for (`0` for the entry).
    pub fn ch(&self) -> u8 {
        self.ch
    }

    pub fn is_start(&self) -> bool {
        self.is_start
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Whether this state was synthesized by a `*`.
    pub fn is_closure(&self) -> bool {
        self.closure
    }

    /// Whether this state has at least one outgoing epsilon transition.
    pub fn is_epsilon_source(&self) -> bool {
        self.epsilon_source
    }

    /// Outgoing transitions in insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// Walks a membership ring starting at its representative, visiting every
/// member exactly once.  Stop early with [`Iterator::any`] or
/// [`Iterator::find`].
#[derive(Clone, Debug)]
pub struct Members<'a> {
    states: &'a [State],
    rep: StateIdx,
    cur: Option<StateIdx>,
}

impl<'a> Members<'a> {
    fn new(states: &'a [State], rep: StateIdx) -> Self {
        Self {
            states,
            rep,
            cur: Some(rep),
        }
    }
}

impl Iterator for Members<'_> {
    type Item = StateIdx;

    fn next(&mut self) -> Option<StateIdx> {
        let cur = self.cur?;
        let next = self.states[cur].next;
        self.cur = (next != self.rep).then_some(next);
        Some(cur)
    }
}

// ---------------------------------------------------------------------------
// Compiled automaton
// ---------------------------------------------------------------------------

struct StateList(Box<[State]>);

impl fmt::Debug for StateList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.0.iter().enumerate()).finish()
    }
}

impl std::ops::Deref for StateList {
    type Target = [State];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled automaton.
///
/// Immutable once built; any number of matchers may borrow it at the same
/// time, since all per-match bookkeeping lives in the matchers.
#[derive(Debug)]
pub struct Automaton {
    states: StateList,
    entry: StateIdx,
    /// Whether some cycle is made of epsilon edges only.
    epsilon_cyclic: bool,
}

impl Automaton {
    fn new(states: Box<[State]>, entry: StateIdx) -> Self {
        let epsilon_cyclic = find_epsilon_cycle(&states);
        Self {
            states: StateList(states),
            entry,
            epsilon_cyclic,
        }
    }

    /// The entry state.  It is both start and final before compilation, so
    /// the empty pattern accepts the empty input.
    pub fn entry(&self) -> StateIdx {
        self.entry
    }

    /// Number of states in the automaton.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, idx: StateIdx) -> &State {
        &self.states[idx]
    }

    /// Every state of the automaton, in membership-ring order starting at
    /// the entry state.
    pub fn states(&self) -> Members<'_> {
        Members::new(&self.states, self.entry)
    }

    /// Outgoing transitions of `idx`, in insertion order.
    #[inline]
    pub fn transitions(&self, idx: StateIdx) -> &[Transition] {
        &self.states[idx].transitions
    }

    /// States that may seed a match attempt.
    pub fn starts(&self) -> impl Iterator<Item = StateIdx> + '_ {
        self.states().filter(|&idx| self.states[idx].is_start)
    }

    /// Whether the automaton can loop without consuming input, as `()*`
    /// does.
    pub fn has_epsilon_cycle(&self) -> bool {
        self.epsilon_cyclic
    }

    /// Backtracking budget for this automaton.
    ///
    /// Without epsilon cycles a path cannot take more epsilon edges than
    /// there are states, so the budget is the state count (at least
    /// [`DEFAULT_BUDGET`]) and the backtracker agrees with the simulation
    /// on every closure-free pattern.  Epsilon-cyclic automata keep
    /// [`DEFAULT_BUDGET`], since their search grows exponentially with the
    /// budget.
    pub fn default_budget(&self) -> usize {
        if self.epsilon_cyclic {
            DEFAULT_BUDGET
        } else {
            DEFAULT_BUDGET.max(self.state_count())
        }
    }

    /// Return the total memory footprint (in bytes) of this automaton,
    /// including the heap-allocated transition lists.
    pub fn memory_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        let states_alloc = self.states.len() * std::mem::size_of::<State>();
        let transitions_alloc: usize = self
            .states
            .iter()
            .map(|s| s.transitions.capacity() * std::mem::size_of::<Transition>())
            .sum();
        inline + states_alloc + transitions_alloc
    }

    /// Emit a Graphviz DOT representation of the automaton.  States are
    /// listed in breadth-first discovery order from the entry state.
    pub fn to_dot(&self, mut buffer: impl Write) -> io::Result<()> {
        writeln!(buffer, "digraph nfa {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        let mut seen = IndexSet::new();
        seen.insert(self.entry);
        let mut i = 0;
        while let Some(&idx) = seen.get_index(i) {
            let state = &self.states[idx];
            let shape = if state.is_final {
                "doublecircle"
            } else {
                "circle"
            };
            let style = if state.is_start { ", style=bold" } else { "" };
            writeln!(
                buffer,
                "\t{} [shape={}{}]; // {:?}",
                idx,
                shape,
                style,
                state.ch as char
            )?;
            for t in &state.transitions {
                seen.insert(t.to);
                writeln!(buffer, "\t{} -> {} [label=\"{}\"];", idx, t.to, t.label)?;
            }
            i += 1;
        }
        writeln!(buffer, "}}")
    }
}

/// Depth-first search over epsilon edges only, with an explicit stack of
/// `(state, next transition to look at)`.
fn find_epsilon_cycle(states: &[State]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        OnPath,
        Done,
    }

    let mut marks = vec![Mark::New; states.len()];
    let mut path: Vec<(StateIdx, usize)> = Vec::new();
    for root in 0..states.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::OnPath;
        path.push((StateIdx(root as u32), 0));
        while let Some(top) = path.last_mut() {
            let (idx, pos) = *top;
            top.1 += 1;
            let Some(t) = states[idx].transitions.get(pos) else {
                marks[idx.idx()] = Mark::Done;
                path.pop();
                continue;
            };
            if !t.label.is_epsilon() {
                continue;
            }
            match marks[t.to.idx()] {
                Mark::OnPath => return true,
                Mark::New => {
                    marks[t.to.idx()] = Mark::OnPath;
                    path.push((t.to, 0));
                }
                Mark::Done => {}
            }
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Pattern compiler
// ---------------------------------------------------------------------------

/// A pattern byte classified by its role in the grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Symbol(u8),
    Closure,
    OpenUnion,
    CloseUnion,
    OpenConcat,
    CloseConcat,
}

impl Token {
    fn of(b: u8) -> Self {
        match b {
            b'*' => Token::Closure,
            b'[' => Token::OpenUnion,
            b']' => Token::CloseUnion,
            b'(' => Token::OpenConcat,
            b')' => Token::CloseConcat,
            _ => Token::Symbol(b),
        }
    }
}

/// Read position within a pattern.
struct Cursor<'p> {
    pattern: &'p [u8],
    pos: usize,
}

impl<'p> Cursor<'p> {
    fn new(pattern: &'p [u8]) -> Self {
        Self { pattern, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<Token> {
        self.pattern.get(self.pos).copied().map(Token::of)
    }

    #[inline]
    fn bump(&mut self) {
        self.pos += 1;
    }
}

/// Compiles patterns into [`Automaton`]s.
///
/// The builder owns the state arena while a pattern is being parsed and
/// can be reused; every [`build`](Self::build) starts from scratch.
///
/// The parser never builds an intermediate syntax tree: every
/// subexpression becomes a fragment as soon as it is recognized, and
/// fragments are combined in place by `concat`, `union` and `closure`.
#[derive(Debug, Default)]
pub struct AutomatonBuilder {
    states: Vec<State>,
    /// Scratch list of final states collected during composition.
    finals: Vec<StateIdx>,
}

impl AutomatonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Low-level automaton primitives --------------------------------------

    /// Push a fresh state, alone in its own membership ring.
    fn new_state(&mut self, ch: u8) -> StateIdx {
        let idx = StateIdx(self.states.len() as u32);
        self.states.push(State::new(idx, ch));
        idx
    }

    #[inline]
    fn state_mut(&mut self, idx: StateIdx) -> &mut State {
        &mut self.states[idx.idx()]
    }

    /// Add a transition from `from` to `to`.  Transitions keep their
    /// insertion order.
    fn add_transition(&mut self, from: StateIdx, to: StateIdx, label: Label) {
        let state = self.state_mut(from);
        state.transitions.push(Transition { label, to });
        if label.is_epsilon() {
            state.epsilon_source = true;
        }
    }

    /// Merge the membership rings of `one` and `two` in O(1).
    ///
    /// The two states must belong to different rings.
    fn splice(&mut self, one: StateIdx, two: StateIdx) {
        debug_assert!(
            !self.members(one).any(|idx| idx == two),
            "splice: {one} and {two} already share a ring"
        );
        let tail1 = self.states[one.idx()].prev;
        let tail2 = self.states[two.idx()].prev;

        self.state_mut(tail1).next = two;
        self.state_mut(two).prev = tail1;

        self.state_mut(one).prev = tail2;
        self.state_mut(tail2).next = one;
    }

    /// Members of the fragment represented by `rep`.
    fn members(&self, rep: StateIdx) -> Members<'_> {
        Members::new(&self.states, rep)
    }

    /// Fill `self.finals` with the final states of fragment `rep`,
    /// optionally leaving closure markers out.
    fn collect_finals(&mut self, rep: StateIdx, skip_closure: bool) {
        let mut finals = std::mem::take(&mut self.finals);
        finals.clear();
        finals.extend(self.members(rep).filter(|&idx| {
            let s = &self.states[idx.idx()];
            s.is_final && !(skip_closure && s.closure)
        }));
        self.finals = finals;
    }

    // -- Fragment constructors -----------------------------------------------

    /// Two-state fragment: start ──ch──> final.
    fn symbol(&mut self, ch: u8) -> StateIdx {
        let label = if ch == b'.' {
            Label::Any
        } else {
            Label::Byte(ch)
        };
        let start = self.new_state(ch);
        let end = self.new_state(ch);
        self.state_mut(start).is_start = true;
        self.state_mut(end).is_final = true;
        self.add_transition(start, end, label);
        self.splice(start, end);
        start
    }

    /// Single state that is both start and final: matches the empty string.
    fn empty(&mut self, ch: u8) -> StateIdx {
        let idx = self.new_state(ch);
        let state = self.state_mut(idx);
        state.is_start = true;
        state.is_final = true;
        idx
    }

    /// Concatenate `right` after `left`.  Every final state of `left` gets
    /// an epsilon edge to `right` and stops being final.
    fn concat(&mut self, left: Option<StateIdx>, right: StateIdx) -> StateIdx {
        let Some(left) = left else {
            return right;
        };
        trace!("concat {left} . {right}");
        self.collect_finals(left, false);
        for i in 0..self.finals.len() {
            let f = self.finals[i];
            self.add_transition(f, right, Label::Epsilon);
            self.state_mut(f).is_final = false;
        }
        self.state_mut(right).is_start = false;
        self.splice(left, right);
        left
    }

    /// Add `alt` as one more alternative of the union rooted at `node`.
    fn union(&mut self, node: StateIdx, alt: StateIdx) {
        trace!("union {node} | {alt}");
        self.add_transition(node, alt, Label::Epsilon);
        self.splice(node, alt);
        self.state_mut(alt).is_start = false;
    }

    /// Wrap `target` in a Kleene closure rooted at `node`.
    fn closure(&mut self, node: StateIdx, target: StateIdx) -> StateIdx {
        trace!("closure {node} = {target}*");
        self.collect_finals(target, true);
        for i in 0..self.finals.len() {
            let f = self.finals[i];
            self.add_transition(f, node, Label::Epsilon);
        }
        let state = self.state_mut(node);
        state.is_start = true;
        state.is_final = true;
        state.closure = true;
        self.state_mut(target).is_start = false;
        self.add_transition(node, target, Label::Epsilon);
        self.splice(node, target);
        node
    }

    // -- Parser --------------------------------------------------------------

    /// Parse one subexpression starting with `token` (the cursor still
    /// points at it), including any postfix `*`s, and return the
    /// representative of its fragment.
    fn next_subex(&mut self, token: Token, cursor: &mut Cursor<'_>) -> Result<StateIdx, Error> {
        let pos = cursor.pos;
        cursor.bump();

        let mut subex = match token {
            Token::Symbol(ch) => self.symbol(ch),
            Token::Closure => return Err(Error::UnexpectedClosure { pos }),
            Token::CloseConcat => {
                return Err(Error::UnexpectedCloseToken { pos, token: ')' });
            }
            Token::CloseUnion => {
                return Err(Error::UnexpectedCloseToken { pos, token: ']' });
            }
            Token::OpenUnion => {
                let node = self.new_state(b'[');
                self.state_mut(node).is_start = true;
                loop {
                    match cursor.peek() {
                        None => return Err(Error::UnbalancedUnion { pos }),
                        Some(Token::CloseUnion) => {
                            cursor.bump();
                            break;
                        }
                        Some(token) => {
                            let alt = self.next_subex(token, cursor)?;
                            self.union(node, alt);
                        }
                    }
                }
                node
            }
            Token::OpenConcat => {
                let mut seq = None;
                loop {
                    match cursor.peek() {
                        None => return Err(Error::UnbalancedConcat { pos }),
                        Some(Token::CloseConcat) => {
                            cursor.bump();
                            break;
                        }
                        Some(token) => {
                            let next = self.next_subex(token, cursor)?;
                            seq = Some(self.concat(seq, next));
                        }
                    }
                }
                match seq {
                    Some(seq) => seq,
                    None => self.empty(b'('),
                }
            }
        };

        // A trailing `*` binds to whatever was just built, at any depth.
        while cursor.peek() == Some(Token::Closure) {
            cursor.bump();
            let node = self.new_state(b'*');
            subex = self.closure(node, subex);
        }

        Ok(subex)
    }

    /// Compile `pattern` into a ready-to-match [`Automaton`].
    ///
    /// The top level is an implicit concatenation of subexpressions glued
    /// onto the entry state.  Nothing is returned on error.
    pub fn build(&mut self, pattern: &str) -> Result<Automaton, Error> {
        self.states.clear();
        self.finals.clear();

        let entry = self.empty(0);
        let mut cursor = Cursor::new(pattern.as_bytes());
        while let Some(token) = cursor.peek() {
            let subex = self.next_subex(token, &mut cursor)?;
            self.concat(Some(entry), subex);
        }

        debug!(
            "compiled pattern {:?} into {} states",
            pattern,
            self.states.len()
        );

        Ok(Automaton::new(self.states.to_vec().into_boxed_slice(), entry))
    }
}

/// Compile `pattern` with a fresh [`AutomatonBuilder`].
///
/// An empty group `()` is accepted and matches only the empty string; it
/// is a single start-and-final state, so `()*` compiles to an epsilon
/// cycle.  An empty union `[]` matches nothing.
pub fn compile(pattern: &str) -> Result<Automaton, Error> {
    AutomatonBuilder::new().build(pattern)
}

// ---------------------------------------------------------------------------
// Backtracking matcher
// ---------------------------------------------------------------------------

/// Depth-first matcher with a bounded epsilon-recursion budget.
///
/// For each state, epsilon moves are tried first (input unchanged), then
/// acceptance at end of input, then labeled moves.  The first successful
/// branch wins.
///
/// Each level of epsilon exploration spends one unit of budget, returned
/// when the level is left.  A branch entered with no budget left is
/// rejected, which guarantees termination on epsilon cycles but may reject
/// inputs that are in the language when they need a long chain of epsilon
/// moves (for example many iterations of a closure).  Such rejections are
/// not errors; check [`budget_exhausted`](Self::budget_exhausted) to tell
/// them apart from a clean rejection.
///
/// The budget also bounds the running time, which on epsilon-cyclic
/// automata grows exponentially with it: every unit lets each cycle be
/// re-entered once more on every branch.  `(()*()*)*` against `a` takes
/// about 1.5 times longer per extra unit.  Prefer
/// [`Automaton::default_budget`] over large hand-picked values.
#[derive(Debug)]
pub struct Backtracker<'a> {
    automaton: &'a Automaton,
    budget: usize,
    remaining: usize,
    exhausted: bool,
}

impl<'a> Backtracker<'a> {
    pub fn new(automaton: &'a Automaton, budget: usize) -> Self {
        Self {
            automaton,
            budget,
            remaining: budget,
            exhausted: false,
        }
    }

    /// Decide whether the whole of `input` is accepted.  The budget is
    /// reset on every call.
    pub fn accepts(&mut self, input: &[u8]) -> bool {
        self.remaining = self.budget;
        self.exhausted = false;
        let automaton = self.automaton;
        automaton.starts().any(|start| self.accepts_from(start, input))
    }

    /// Whether the budget ran out at least once during the last
    /// [`accepts`](Self::accepts) call.
    pub fn budget_exhausted(&self) -> bool {
        self.exhausted
    }

    fn accepts_from(&mut self, idx: StateIdx, input: &[u8]) -> bool {
        if self.remaining == 0 {
            if !self.exhausted {
                trace!("backtracking budget of {} exhausted at state {idx}", self.budget);
            }
            self.exhausted = true;
            return false;
        }

        let automaton = self.automaton;
        let transitions = automaton.transitions(idx);

        self.remaining -= 1;
        let found = transitions
            .iter()
            .filter(|t| t.label.is_epsilon())
            .any(|t| self.accepts_from(t.to, input));
        self.remaining += 1;
        if found {
            return true;
        }

        let Some((&b, rest)) = input.split_first() else {
            return automaton.state(idx).is_final;
        };

        transitions
            .iter()
            .filter(|t| t.label.accepts(b))
            .any(|t| self.accepts_from(t.to, rest))
    }
}

/// Run the backtracking matcher over `input` with the given budget.
///
/// A budget smaller than the number of epsilon edges an accepting path
/// needs makes this return `false`, even for closure-free patterns: a
/// literal of `n` bytes needs a budget above `n`.  Pass
/// [`Automaton::default_budget`] to stay in agreement with
/// [`match_simulation`] on those.
pub fn match_backtracking(automaton: &Automaton, input: impl AsRef<[u8]>, budget: usize) -> bool {
    Backtracker::new(automaton, budget).accepts(input.as_ref())
}

// ---------------------------------------------------------------------------
// Simulation matcher
// ---------------------------------------------------------------------------

/// Reusable memory for [`Simulation`].  Create once, call
/// [`simulation`](Self::simulation) for each match attempt.
///
/// Holds the double-buffered pebble tables indexed by [`StateIdx`], so the
/// automaton itself is never written to while matching.
#[derive(Debug, Default)]
pub struct SimulationMemory {
    /// Pebbles for the current step.
    active: Vec<bool>,
    /// Pebbles being placed for the next step.
    next: Vec<bool>,
    /// Worklist for the epsilon closure.
    stack: Vec<StateIdx>,
    /// States that keep their pebble after a labeled move.
    rearmed: Vec<StateIdx>,
}

impl SimulationMemory {
    pub fn simulation<'a>(&'a mut self, automaton: &'a Automaton) -> Simulation<'a> {
        let len = automaton.state_count();
        self.active.clear();
        self.active.resize(len, false);
        self.next.clear();
        self.next.resize(len, false);
        self.stack.clear();
        self.rearmed.clear();

        let mut sim = Simulation {
            automaton,
            active: &mut self.active,
            next: &mut self.next,
            stack: &mut self.stack,
            rearmed: &mut self.rearmed,
            steps: 0,
        };
        sim.start();
        sim
    }
}

/// Breadth-first pebble simulation over an [`Automaton`].
///
/// Runs in O(|input| × (states + transitions)) time whatever the shape of
/// the epsilon graph.
pub struct Simulation<'a> {
    automaton: &'a Automaton,
    active: &'a mut [bool],
    next: &'a mut [bool],
    stack: &'a mut Vec<StateIdx>,
    rearmed: &'a mut Vec<StateIdx>,
    /// Number of bytes consumed so far.
    steps: usize,
}

impl fmt::Debug for Simulation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active: Vec<u32> = self.active_states().map(StateIdx::id).collect();
        f.debug_struct("Simulation")
            .field("steps", &self.steps)
            .field("active", &active)
            .field("is_match", &self.is_match())
            .finish()
    }
}

impl<'a> Simulation<'a> {
    /// Place a pebble on every start state, then commit.
    fn start(&mut self) {
        let automaton = self.automaton;
        for idx in automaton.starts() {
            self.mark_active(idx);
        }
        self.commit();
    }

    /// Place a pebble on `idx` for the next step, together with its whole
    /// epsilon closure.  States that already hold a next-step pebble are
    /// not revisited, which keeps epsilon cycles finite.
    fn mark_active(&mut self, idx: StateIdx) {
        let automaton = self.automaton;
        self.stack.push(idx);
        while let Some(idx) = self.stack.pop() {
            if self.next[idx.idx()] {
                continue;
            }
            self.next[idx.idx()] = true;
            for t in automaton.transitions(idx) {
                if t.label.is_epsilon() && !self.next[t.to.idx()] {
                    self.stack.push(t.to);
                }
            }
        }
    }

    /// Make the next-step pebbles current and clear the next-step table.
    fn commit(&mut self) {
        for (active, next) in self.active.iter_mut().zip(self.next.iter_mut()) {
            *active = std::mem::take(next);
        }
    }

    fn active_states(&self) -> impl Iterator<Item = StateIdx> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter(|&(_, &on)| on)
            .map(|(i, _)| StateIdx(i as u32))
    }

    /// Advance every pebble over one input byte.
    ///
    /// A state that is an epsilon source and also moved on `b` keeps its
    /// own pebble for the next step.
    pub fn step(&mut self, b: u8) {
        let automaton = self.automaton;
        for i in 0..self.active.len() {
            if !self.active[i] {
                continue;
            }
            let idx = StateIdx(i as u32);
            let mut moved = false;
            for t in automaton.transitions(idx) {
                if t.label.accepts(b) {
                    self.mark_active(t.to);
                    moved = true;
                }
            }
            if moved && automaton.state(idx).epsilon_source {
                self.rearmed.push(idx);
            }
        }
        for idx in self.rearmed.drain(..) {
            self.next[idx.idx()] = true;
        }
        self.commit();
        self.steps += 1;

        if log_enabled!(Level::Trace) {
            trace!(
                "step {} ({:?}): {} active",
                self.steps,
                b as char,
                self.active_states().count()
            );
        }
    }

    /// Feed an entire byte slice through the simulation, one byte at a
    /// time.
    pub fn chunk(&mut self, input: &[u8]) {
        for &b in input {
            self.step(b);
        }
    }

    /// Whether any pebble currently sits on a final state, i.e. whether the
    /// input consumed so far is accepted.
    pub fn is_match(&self) -> bool {
        let automaton = self.automaton;
        self.active_states().any(|idx| automaton.state(idx).is_final)
    }

    /// Signal end of input and return the verdict.
    pub fn finish(self) -> bool {
        self.is_match()
    }
}

/// Run the simulation matcher over `input`.
pub fn match_simulation(automaton: &Automaton, input: impl AsRef<[u8]>) -> bool {
    let mut memory = SimulationMemory::default();
    let mut sim = memory.simulation(automaton);
    sim.chunk(input.as_ref());
    sim.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
