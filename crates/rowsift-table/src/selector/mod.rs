//! CSS-style selectors for tables and row-relative cell lookups.
//!
//! Supported: type (`table`, `td`, `th`, `*`), `#id`, `.class`, attribute
//! selectors (`[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`,
//! `[a|=v]`), `:nth-child(An+B)`, `:first-child`, `:last-child`, `:not(...)`
//! and comma-separated lists. Combinators are rejected at parse time.

mod parser;

use std::borrow::Cow;

use smallvec::SmallVec;

pub use parser::parse_selector;

/// Anything a compound selector can be tested against.
pub trait Element {
    /// Lowercase tag name.
    fn local_name(&self) -> &str;
    fn element_id(&self) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
    /// Attribute lookup. `id` and `class` resolve to the element id and the
    /// space-joined class list.
    fn attribute(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// 1-based position of an element among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingPosition {
    pub index: usize,
    pub count: usize,
}

impl SiblingPosition {
    pub fn new(index: usize, count: usize) -> Self {
        Self { index, count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelector {
    Universal,
    Tag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    /// `[a=v]`
    Equals,
    /// `[a~=v]` whitespace-separated word
    Includes,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
    /// `[a*=v]`
    Substring,
    /// `[a|=v]` exact or `v-` prefixed
    DashMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub matcher: Option<(AttrOperator, String)>,
}

impl AttributeSelector {
    fn matches(&self, element: &impl Element) -> bool {
        let Some(actual) = element.attribute(&self.name) else {
            return false;
        };
        let Some((op, expected)) = &self.matcher else {
            return true;
        };
        let expected = expected.as_str();
        match op {
            AttrOperator::Equals => actual == expected,
            AttrOperator::Includes => actual.split_whitespace().any(|w| w == expected),
            AttrOperator::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOperator::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOperator::Substring => !expected.is_empty() && actual.contains(expected),
            AttrOperator::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
        }
    }
}

/// `An+B` as used by `:nth-child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NthExpr {
    pub a: i32,
    pub b: i32,
}

impl NthExpr {
    pub fn new(a: i32, b: i32) -> Self {
        Self { a, b }
    }

    /// Whether the 1-based `index` is `a*n + b` for some `n >= 0`.
    pub fn matches(&self, index: usize) -> bool {
        let index = index as i64;
        let (a, b) = (i64::from(self.a), i64::from(self.b));
        if a == 0 {
            return index == b;
        }
        let diff = index - b;
        diff % a == 0 && diff / a >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    NthChild(NthExpr),
    FirstChild,
    LastChild,
    Not(Box<CompoundSelector>),
}

impl PseudoClass {
    fn matches(&self, element: &impl Element, position: SiblingPosition) -> bool {
        match self {
            PseudoClass::NthChild(nth) => nth.matches(position.index),
            PseudoClass::FirstChild => position.index == 1,
            PseudoClass::LastChild => position.index == position.count,
            PseudoClass::Not(inner) => !inner.matches(element, position),
        }
    }
}

/// A sequence of simple selectors that must all match one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub type_selector: Option<TypeSelector>,
    pub id: Option<String>,
    pub classes: SmallVec<[String; 2]>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo_classes: Vec<PseudoClass>,
}

impl CompoundSelector {
    pub fn is_empty(&self) -> bool {
        self.type_selector.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.pseudo_classes.is_empty()
    }

    pub fn matches(&self, element: &impl Element, position: SiblingPosition) -> bool {
        if let Some(TypeSelector::Tag(tag)) = &self.type_selector
            && !element.local_name().eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if let Some(id) = &self.id
            && element.element_id() != Some(id.as_str())
        {
            return false;
        }
        self.classes.iter().all(|c| element.has_class(c))
            && self.attributes.iter().all(|a| a.matches(element))
            && self
                .pseudo_classes
                .iter()
                .all(|p| p.matches(element, position))
    }
}

/// Comma-separated alternatives; matches when any alternative does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    alternatives: SmallVec<[CompoundSelector; 1]>,
}

impl SelectorList {
    pub(crate) fn new(alternatives: SmallVec<[CompoundSelector; 1]>) -> Self {
        Self { alternatives }
    }

    pub fn alternatives(&self) -> &[CompoundSelector] {
        &self.alternatives
    }

    pub fn matches(&self, element: &impl Element, position: SiblingPosition) -> bool {
        self.alternatives
            .iter()
            .any(|alt| alt.matches(element, position))
    }

    /// First element of `siblings` (in order) that matches.
    pub fn first_match<'a, E: Element>(&self, siblings: &'a [E]) -> Option<&'a E> {
        let count = siblings.len();
        siblings
            .iter()
            .enumerate()
            .find(|(idx, el)| self.matches(*el, SiblingPosition::new(idx + 1, count)))
            .map(|(_, el)| el)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Fake {
        tag: &'static str,
        id: Option<&'static str>,
        classes: Vec<&'static str>,
        attrs: BTreeMap<&'static str, &'static str>,
    }

    impl Fake {
        fn td() -> Self {
            Self {
                tag: "td",
                id: None,
                classes: vec![],
                attrs: BTreeMap::new(),
            }
        }
    }

    impl Element for Fake {
        fn local_name(&self) -> &str {
            self.tag
        }
        fn element_id(&self) -> Option<&str> {
            self.id
        }
        fn has_class(&self, class: &str) -> bool {
            self.classes.iter().any(|c| *c == class)
        }
        fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
            self.attrs.get(name).map(|v| Cow::Borrowed(*v))
        }
    }

    #[test]
    fn nth_expressions() {
        let odd = NthExpr::new(2, 1);
        assert!(odd.matches(1) && odd.matches(3) && !odd.matches(2));
        let third = NthExpr::new(0, 3);
        assert!(third.matches(3) && !third.matches(6));
        let first_two = NthExpr::new(-1, 2);
        assert!(first_two.matches(1) && first_two.matches(2) && !first_two.matches(3));
    }

    #[test]
    fn first_match_respects_position() {
        let cells = vec![Fake::td(), Fake::td(), Fake::td()];
        let sel = parse_selector("td:nth-child(2)").unwrap();
        let hit = sel.first_match(&cells).unwrap();
        assert!(std::ptr::eq(hit, &cells[1]));
        let last = parse_selector(":last-child").unwrap();
        assert!(std::ptr::eq(last.first_match(&cells).unwrap(), &cells[2]));
    }

    #[test]
    fn attribute_operators() {
        let mut cell = Fake::td();
        cell.attrs.insert("data-kind", "price total");
        cell.attrs.insert("lang", "en-GB");
        let pos = SiblingPosition::new(1, 1);
        for (text, expected) in [
            ("[data-kind]", true),
            ("[data-kind~=total]", true),
            ("[data-kind^=pri]", true),
            ("[data-kind$=\"tal\"]", true),
            ("[data-kind*=\"ce t\"]", true),
            ("[data-kind=price]", false),
            ("[lang|=en]", true),
            ("[lang|=e]", false),
            ("[missing]", false),
        ] {
            let sel = parse_selector(text).unwrap();
            assert_eq!(sel.matches(&cell, pos), expected, "{text}");
        }
    }

    #[test]
    fn compound_requires_every_part() {
        let mut cell = Fake::td();
        cell.classes = vec!["num", "price"];
        cell.id = Some("total");
        let pos = SiblingPosition::new(2, 4);
        assert!(parse_selector("td.num.price#total").unwrap().matches(&cell, pos));
        assert!(!parse_selector("th.num").unwrap().matches(&cell, pos));
        assert!(!parse_selector("td.num:not(.price)").unwrap().matches(&cell, pos));
        assert!(parse_selector("th, .price").unwrap().matches(&cell, pos));
    }
}
