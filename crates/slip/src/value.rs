//! Self-contained values over a shared arena.
//!
//! A [`Value`] is a view into a frozen arena: the buffer, the symbol table,
//! and a root offset. The buffer and symbol table sit behind `Arc`, so
//! cloning a value or taking a sub-view (a list element, the inner value of a
//! wrapper) is cheap and never invalidates other views. The arena is never
//! mutated after parsing; fresh values are produced by building a new arena
//! and grafting existing graphs into it.

use std::{fmt, sync::Arc};

use crate::{
    arena::{ArenaBuf, Kind, UNIT_SIZE, Unit},
    intern::SymbolTable,
};

/// A parsed or constructed value.
///
/// The empty value (no arena) has kind [`Kind::None`]; every other value is
/// fully self-contained and remains valid for as long as any clone of it
/// lives.
#[derive(Debug, Clone)]
pub struct Value {
    data: Arc<ArenaBuf>,
    symbols: Arc<SymbolTable>,
    root: usize,
}

impl Default for Value {
    fn default() -> Self {
        Self::none()
    }
}

impl Value {
    /// The empty value: kind `None`, no arena.
    #[must_use]
    pub fn none() -> Self {
        Self {
            data: Arc::new(ArenaBuf::new()),
            symbols: Arc::new(SymbolTable::new()),
            root: 0,
        }
    }

    pub(crate) fn from_parts(data: Arc<ArenaBuf>, symbols: Arc<SymbolTable>, root: usize) -> Self {
        Self { data, symbols, root }
    }

    /// Re-roots this view at a different offset within the same arena.
    pub(crate) fn at_offset(&self, offset: usize) -> Self {
        Self {
            data: Arc::clone(&self.data),
            symbols: Arc::clone(&self.symbols),
            root: offset,
        }
    }

    pub(crate) fn unit(&self) -> Option<Unit> {
        self.data.unit(self.root)
    }

    /// The value's kind tag. The empty value reports `None`.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.unit().and_then(|u| u.kind()).unwrap_or(Kind::None)
    }

    /// The integer payload, when this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self.unit() {
            Some(u) if u.kind() == Some(Kind::Int) => Some(u.payload as i64),
            _ => None,
        }
    }

    /// The floating-point payload, when this is a `Real`.
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self.unit() {
            Some(u) if u.kind() == Some(Kind::Real) => Some(f64::from_bits(u.payload)),
            _ => None,
        }
    }

    /// The code point, when this is a `Rune`.
    #[must_use]
    pub fn as_rune(&self) -> Option<char> {
        match self.unit() {
            Some(u) if u.kind() == Some(Kind::Rune) => {
                char::from_u32(u32::try_from(u.payload).ok()?)
            }
            _ => None,
        }
    }

    /// The interned name, when this is a `Symbol`.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        match self.unit() {
            Some(u) if u.kind() == Some(Kind::Symbol) => self.symbols.name(u.payload),
            _ => None,
        }
    }

    /// The lambda (or other opaque) id, when this is an `Aberrant`.
    #[must_use]
    pub fn aberrant_id(&self) -> Option<u64> {
        match self.unit() {
            Some(u) if u.kind() == Some(Kind::Aberrant) => Some(u.payload),
            _ => None,
        }
    }

    /// Element count for lists and strings; 0 for everything else.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.unit() {
            Some(u) if u.kind().is_some_and(|k| k.is_list() || k == Kind::Str) => u.flags as usize,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index` of a list or string value.
    #[must_use]
    pub fn element(&self, index: usize) -> Option<Self> {
        let unit = self.unit()?;
        let kind = unit.kind()?;
        if !(kind.is_list() || kind == Kind::Str) || index >= unit.flags as usize {
            return None;
        }
        let array_pos = usize::try_from(unit.payload).ok()?;
        let offset = self.data.offset_entry(array_pos, index)?;
        if offset.checked_add(UNIT_SIZE)? > self.data.len() {
            return None;
        }
        Some(self.at_offset(offset))
    }

    /// Iterates the elements of a list or string value.
    pub fn elements(&self) -> impl Iterator<Item = Self> + '_ {
        (0..self.len()).filter_map(|i| self.element(i))
    }

    /// The wrapped value of a `Some`, `Error`, or `Datum`.
    #[must_use]
    pub fn inner(&self) -> Option<Self> {
        let unit = self.unit()?;
        if !unit.kind()?.is_wrapper() {
            return None;
        }
        let offset = usize::try_from(unit.payload).ok()?;
        if offset.checked_add(UNIT_SIZE)? > self.data.len() {
            return None;
        }
        Some(self.at_offset(offset))
    }

    /// Collects a `Str` value's runes into an owned string.
    #[must_use]
    pub fn string_value(&self) -> Option<String> {
        if self.kind() != Kind::Str {
            return None;
        }
        let mut out = String::with_capacity(self.len());
        for i in 0..self.len() {
            out.push(self.element(i)?.as_rune()?);
        }
        Some(out)
    }

    /// Deep structural equality.
    ///
    /// Symbols compare by name (never by id, which is arena-local); lists
    /// compare kind, length, and elements; wrappers compare their payloads.
    #[must_use]
    pub fn structural_eq(&self, other: &Self) -> bool {
        let kind = self.kind();
        if kind != other.kind() {
            return false;
        }
        match kind {
            Kind::None => true,
            Kind::Int => self.as_int() == other.as_int(),
            Kind::Real => self.as_real() == other.as_real(),
            Kind::Rune => self.as_rune() == other.as_rune(),
            Kind::Symbol => self.symbol_name() == other.symbol_name(),
            Kind::Aberrant => self.aberrant_id() == other.aberrant_id(),
            Kind::Str | Kind::ParenList | Kind::BracketList | Kind::BraceList => {
                self.len() == other.len()
                    && (0..self.len()).all(|i| match (self.element(i), other.element(i)) {
                        (Some(a), Some(b)) => a.structural_eq(&b),
                        _ => false,
                    })
            }
            Kind::Some | Kind::Error | Kind::Datum => match (self.inner(), other.inner()) {
                (Some(a), Some(b)) => a.structural_eq(&b),
                (None, None) => true,
                _ => false,
            },
        }
    }

    /// Walks the graph from the root, verifying the arena invariants: every
    /// referenced offset is in bounds and decodes to a known tag, list flags
    /// match their element counts, children precede their containers, and
    /// every symbol id resolves.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.data.is_empty() {
            return Ok(());
        }
        self.check_node(self.root)
    }

    fn check_node(&self, offset: usize) -> Result<(), String> {
        let unit = self
            .data
            .unit(offset)
            .ok_or_else(|| format!("offset {offset} out of bounds"))?;
        let kind = unit
            .kind()
            .ok_or_else(|| format!("unknown tag {} at offset {offset}", unit.tag))?;
        match kind {
            Kind::Symbol => {
                if !self.symbols.contains(unit.payload) {
                    return Err(format!("dangling symbol id {} at offset {offset}", unit.payload));
                }
            }
            Kind::Str | Kind::ParenList | Kind::BracketList | Kind::BraceList => {
                let count = unit.flags as usize;
                let array_pos = usize::try_from(unit.payload)
                    .map_err(|_| format!("bad element array position at offset {offset}"))?;
                for index in 0..count {
                    let element = self
                        .data
                        .offset_entry(array_pos, index)
                        .ok_or_else(|| format!("element array of offset {offset} out of bounds"))?;
                    if element >= offset {
                        return Err(format!(
                            "element {element} does not precede its container {offset}"
                        ));
                    }
                    self.check_node(element)?;
                }
            }
            Kind::Some | Kind::Error | Kind::Datum => {
                let inner = usize::try_from(unit.payload)
                    .map_err(|_| format!("bad wrapper payload at offset {offset}"))?;
                if inner >= offset {
                    return Err(format!("wrapped value {inner} does not precede {offset}"));
                }
                self.check_node(inner)?;
            }
            Kind::None | Kind::Int | Kind::Real | Kind::Rune | Kind::Aberrant => {}
        }
        Ok(())
    }

    // --- constructors -----------------------------------------------------

    #[must_use]
    pub fn int(value: i64) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_int(value);
        builder.finish(root)
    }

    #[must_use]
    pub fn real(value: f64) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_real(value);
        builder.finish(root)
    }

    #[must_use]
    pub fn rune(value: char) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_rune(value);
        builder.finish(root)
    }

    #[must_use]
    pub fn symbol(name: &str) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_symbol(name);
        builder.finish(root)
    }

    #[must_use]
    pub fn string(text: &str) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_str(text);
        builder.finish(root)
    }

    #[must_use]
    pub fn aberrant(id: u64) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.push_aberrant(id);
        builder.finish(root)
    }

    /// Builds a list of the given kind from existing values, grafting each
    /// element's graph into the fresh arena.
    #[must_use]
    pub fn list(kind: Kind, items: &[Self]) -> Self {
        debug_assert!(kind.is_list());
        let mut builder = ArenaBuilder::new();
        let offsets: Vec<usize> = items.iter().map(|item| builder.graft(item)).collect();
        let root = builder.push_list(kind, &offsets);
        builder.finish(root)
    }

    /// Wraps an existing value as `Some`, `Error`, or `Datum`.
    #[must_use]
    pub fn wrap(kind: Kind, inner: &Self) -> Self {
        debug_assert!(kind.is_wrapper());
        let mut builder = ArenaBuilder::new();
        let inner_offset = builder.graft(inner);
        let root = builder.push_wrapper(kind, inner_offset);
        builder.finish(root)
    }

    /// An error value carrying a string diagnostic, i.e. `@"message"`.
    #[must_use]
    pub fn error_message(message: &str) -> Self {
        let mut builder = ArenaBuilder::new();
        let inner = builder.push_str(message);
        let root = builder.push_wrapper(Kind::Error, inner);
        builder.finish(root)
    }

    /// Copies this value into a brand new arena of its own.
    ///
    /// Used when installing values whose backing arena should not be kept
    /// alive (for example exports cloned into a parent context).
    #[must_use]
    pub fn detached(&self) -> Self {
        let mut builder = ArenaBuilder::new();
        let root = builder.graft(self);
        builder.finish(root)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::None => write!(f, "none"),
            Kind::Int => write!(f, "{}", self.as_int().unwrap_or_default()),
            Kind::Real => write!(f, "{}", self.as_real().unwrap_or_default()),
            Kind::Rune => write!(f, "{}", self.as_rune().unwrap_or('\u{fffd}')),
            Kind::Symbol => write!(f, "{}", self.symbol_name().unwrap_or("<symbol>")),
            Kind::Aberrant => write!(f, ":fn"),
            Kind::Str => {
                write!(f, "\"")?;
                for element in self.elements() {
                    match element.as_rune() {
                        Some(c @ ('"' | '\\')) => write!(f, "\\{c}")?,
                        Some(c) => write!(f, "{c}")?,
                        None => write!(f, "\u{fffd}")?,
                    }
                }
                write!(f, "\"")
            }
            kind @ (Kind::ParenList | Kind::BracketList | Kind::BraceList) => {
                let (open, close) = match kind {
                    Kind::ParenList => ('(', ')'),
                    Kind::BracketList => ('[', ']'),
                    _ => ('{', '}'),
                };
                write!(f, "{open}")?;
                for (i, element) in self.elements().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "{close}")
            }
            kind @ (Kind::Some | Kind::Error | Kind::Datum) => {
                let prefix = match kind {
                    Kind::Some => '\'',
                    Kind::Error => '@',
                    _ => '#',
                };
                match self.inner() {
                    Some(inner) => write!(f, "{prefix}{inner}"),
                    None => write!(f, "{prefix}none"),
                }
            }
        }
    }
}

/// Incrementally builds an arena and freezes it into a [`Value`].
///
/// The parser and every value constructor funnel through this type, which is
/// the only place arena bytes are written.
#[derive(Debug, Default)]
pub(crate) struct ArenaBuilder {
    buf: ArenaBuf,
    symbols: SymbolTable,
}

impl ArenaBuilder {
    pub fn new() -> Self {
        Self {
            buf: ArenaBuf::new(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn push_int(&mut self, value: i64) -> usize {
        self.buf.push_unit(Kind::Int, 0, value as u64)
    }

    pub fn push_real(&mut self, value: f64) -> usize {
        self.buf.push_unit(Kind::Real, 0, value.to_bits())
    }

    pub fn push_rune(&mut self, value: char) -> usize {
        self.buf.push_unit(Kind::Rune, 0, u64::from(u32::from(value)))
    }

    pub fn push_symbol(&mut self, name: &str) -> usize {
        let id = self.symbols.intern(name);
        self.buf.push_unit(Kind::Symbol, 0, id)
    }

    pub fn push_aberrant(&mut self, id: u64) -> usize {
        self.buf.push_unit(Kind::Aberrant, 0, id)
    }

    pub fn push_none(&mut self) -> usize {
        self.buf.push_unit(Kind::None, 0, 0)
    }

    /// Appends the rune records for `text`, then the string record, then the
    /// element-offset array.
    pub fn push_str(&mut self, text: &str) -> usize {
        let offsets: Vec<usize> = text.chars().map(|c| self.push_rune(c)).collect();
        self.push_list_raw(Kind::Str, &offsets)
    }

    /// Appends a list record over already-written children.
    pub fn push_list(&mut self, kind: Kind, element_offsets: &[usize]) -> usize {
        self.push_list_raw(kind, element_offsets)
    }

    fn push_list_raw(&mut self, kind: Kind, element_offsets: &[usize]) -> usize {
        let list_offset = self.buf.push_unit(kind, element_offsets.len() as u32, 0);
        if element_offsets.is_empty() {
            return list_offset;
        }
        let array_pos = self.buf.push_offsets(element_offsets);
        self.patch_payload(list_offset, array_pos as u64);
        list_offset
    }

    pub fn push_wrapper(&mut self, kind: Kind, inner_offset: usize) -> usize {
        self.buf.push_unit(kind, 0, inner_offset as u64)
    }

    /// Recursively copies `value`'s graph into this arena, re-interning
    /// symbols, and returns the offset of the copied root.
    pub fn graft(&mut self, value: &Value) -> usize {
        match value.kind() {
            Kind::None => self.push_none(),
            Kind::Int => self.push_int(value.as_int().unwrap_or_default()),
            Kind::Real => self.push_real(value.as_real().unwrap_or_default()),
            Kind::Rune => self.push_rune(value.as_rune().unwrap_or('\u{fffd}')),
            Kind::Symbol => self.push_symbol(value.symbol_name().unwrap_or_default()),
            Kind::Aberrant => self.push_aberrant(value.aberrant_id().unwrap_or_default()),
            kind @ (Kind::Str | Kind::ParenList | Kind::BracketList | Kind::BraceList) => {
                let offsets: Vec<usize> =
                    value.elements().map(|element| self.graft(&element)).collect();
                self.push_list_raw(kind, &offsets)
            }
            kind @ (Kind::Some | Kind::Error | Kind::Datum) => {
                let inner = match value.inner() {
                    Some(inner) => self.graft(&inner),
                    None => self.push_none(),
                };
                self.push_wrapper(kind, inner)
            }
        }
    }

    /// Overwrites the payload of an already-written unit.
    ///
    /// Only used to point list records at their element arrays, which are
    /// written after the record itself.
    fn patch_payload(&mut self, unit_offset: usize, payload: u64) {
        self.buf.patch_payload(unit_offset, payload);
    }

    pub fn finish(self, root: usize) -> Value {
        Value::from_parts(Arc::new(self.buf), Arc::new(self.symbols), root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_round_trip() {
        assert_eq!(Value::int(-7).as_int(), Some(-7));
        assert_eq!(Value::real(2.5).as_real(), Some(2.5));
        assert_eq!(Value::rune('λ').as_rune(), Some('λ'));
        assert_eq!(Value::symbol("x").symbol_name(), Some("x"));
        assert_eq!(Value::string("hi").string_value().as_deref(), Some("hi"));
        assert_eq!(Value::aberrant(3).aberrant_id(), Some(3));
        assert_eq!(Value::none().kind(), Kind::None);
    }

    #[test]
    fn list_grafts_elements() {
        let list = Value::list(Kind::BraceList, &[Value::int(1), Value::symbol("a")]);
        assert_eq!(list.kind(), Kind::BraceList);
        assert_eq!(list.len(), 2);
        assert_eq!(list.element(0).unwrap().as_int(), Some(1));
        assert_eq!(list.element(1).unwrap().symbol_name(), Some("a"));
        list.check_integrity().unwrap();
    }

    #[test]
    fn structural_eq_ignores_symbol_ids() {
        // Interning order differs between the two arenas, so ids differ.
        let a = Value::list(Kind::ParenList, &[Value::symbol("x"), Value::symbol("y")]);
        let b = Value::list(Kind::ParenList, &[Value::symbol("x"), Value::symbol("y")]);
        assert!(a.structural_eq(&b));
        assert!(!a.structural_eq(&Value::list(Kind::ParenList, &[Value::symbol("y")])));
    }

    #[test]
    fn error_message_wraps_string() {
        let err = Value::error_message("boom");
        assert_eq!(err.kind(), Kind::Error);
        assert_eq!(err.inner().unwrap().string_value().as_deref(), Some("boom"));
        assert_eq!(err.to_string(), "@\"boom\"");
    }

    #[test]
    fn display_forms() {
        let v = Value::list(
            Kind::BracketList,
            &[Value::int(1), Value::string("a\"b"), Value::rune('c')],
        );
        assert_eq!(v.to_string(), "[1 \"a\\\"b\" c]");
    }
}
