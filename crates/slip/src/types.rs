//! Static type records, `:type` symbol resolution, and the form table.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::arena::Kind;

/// The checker's record for one expression or binding.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: Kind,
    /// Set for `..`-suffixed type symbols used in kernel signatures.
    pub variadic: bool,
    /// Set when this is a registered composite form (`:pair` and friends).
    pub form: Option<String>,
    /// Set when this records a lambda binding; keys the checker's signature
    /// table.
    pub lambda_id: Option<u64>,
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self {
            kind: Kind::None,
            variadic: false,
            form: None,
            lambda_id: None,
        }
    }
}

impl TypeInfo {
    #[must_use]
    pub fn of(kind: Kind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// A callable's declared shape: parameter types, return type, variadic flag.
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: SmallVec<[TypeInfo; 4]>,
    pub ret: TypeInfo,
    pub variadic: bool,
}

/// Named structural tuple types registered via `#(define-form …)`.
///
/// Iteration order is declaration order, which keeps diagnostics and debug
/// output stable.
#[derive(Debug, Default)]
pub struct FormTable {
    forms: IndexMap<String, Vec<TypeInfo>>,
}

impl FormTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            forms: IndexMap::new(),
        }
    }

    pub fn define(&mut self, name: &str, elements: Vec<TypeInfo>) {
        self.forms.insert(name.to_owned(), elements);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.forms.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[TypeInfo]> {
        self.forms.get(name).map(Vec::as_slice)
    }
}

/// Resolves a `:type` symbol to its type record.
///
/// Base names are the value-kind names plus the aliases `any` (the wildcard
/// parameter slot) and `list` (paren list). A `..` suffix marks the variadic
/// variant. Any other name resolves against the registered forms as a brace
/// list of that structure.
#[must_use]
pub fn resolve_type_symbol(symbol: &str, forms: &FormTable) -> Option<TypeInfo> {
    let name = symbol.strip_prefix(':')?;
    let (base, variadic) = match name.strip_suffix("..") {
        Some(stripped) => (stripped, true),
        None => (name, false),
    };
    if base.is_empty() {
        return None;
    }

    let mut info = match base {
        "any" => TypeInfo::of(Kind::None),
        "list" => TypeInfo::of(Kind::ParenList),
        _ => match base.parse::<Kind>() {
            Ok(kind) => TypeInfo::of(kind),
            Err(_) => {
                if !forms.contains(base) {
                    return None;
                }
                TypeInfo {
                    kind: Kind::BraceList,
                    form: Some(base.to_owned()),
                    ..TypeInfo::default()
                }
            }
        },
    };
    info.variadic = variadic;
    Some(info)
}

/// Whether `actual` is acceptable where `expected` is declared.
///
/// `None` is the "any" slot and matches everything; paren lists match paren
/// lists regardless of internal structure; otherwise kinds must be equal.
#[must_use]
pub fn types_match(expected: &TypeInfo, actual: &TypeInfo) -> bool {
    if expected.kind == Kind::None {
        return true;
    }
    if expected.kind == Kind::ParenList && actual.kind == Kind::ParenList {
        return true;
    }
    expected.kind == actual.kind
}
