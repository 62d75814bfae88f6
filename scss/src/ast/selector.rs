use std::fmt;

use serde::{Deserialize, Serialize};

/// `a, b, c`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

/// A sequence of compound selectors and combinators. Two adjacent compounds
/// are joined by the descendant combinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComplexSelector {
    pub components: Vec<SelectorComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectorComponent {
    Compound(CompoundSelector),
    Combinator(Combinator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combinator {
    /// `>`
    Child,
    /// `+`
    NextSibling,
    /// `~`
    FollowingSibling,
}

impl Combinator {
    pub fn symbol(self) -> &'static str {
        match self {
            Combinator::Child => ">",
            Combinator::NextSibling => "+",
            Combinator::FollowingSibling => "~",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Combinator::Child),
            "+" => Some(Combinator::NextSibling),
            "~" => Some(Combinator::FollowingSibling),
            _ => None,
        }
    }
}

/// A run of simple selectors with no whitespace between them: `a.b#c:hover`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimpleSelector {
    /// `&`, optionally followed by a suffix as in `&-item`.
    Parent { suffix: Option<String> },
    /// `*` or `ns|*`.
    Universal(String),
    /// Element name; also keyframe selectors such as `from` and `50%`.
    Type(String),
    Class(String),
    Id(String),
    Placeholder(String),
    /// Full bracketed text, e.g. `[href^='http']`.
    Attribute(String),
    Pseudo {
        name: String,
        /// `::before` (true) vs `:hover` (false).
        element: bool,
        argument: Option<PseudoArgument>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoArgument {
    /// `:not(.a, .b)`, `:is(...)`, `:has(...)`.
    Selector(SelectorList),
    /// `:nth-child(2n+1 of .a)`.
    Nth {
        formula: String,
        of: Option<SelectorList>,
    },
    /// Anything else, e.g. `:lang(en)`.
    Raw(String),
}

/// Pseudo-classes whose argument is a selector list.
pub const SELECTOR_PSEUDOS: &[&str] = &[
    "not", "is", "matches", "where", "has", "any", "-moz-any", "-webkit-any", "current", "host",
    "host-context", "slotted",
];

/// Pseudo-classes whose argument is an `an+b [of S]` formula.
pub const NTH_PSEUDOS: &[&str] = &["nth-child", "nth-last-child", "nth-of-type", "nth-last-of-type"];

impl SelectorList {
    pub fn new(selectors: Vec<ComplexSelector>) -> Self {
        SelectorList { selectors }
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn has_parent_ref(&self) -> bool {
        self.selectors.iter().any(|s| s.has_parent_ref())
    }
}

impl ComplexSelector {
    pub fn from_compound(compound: CompoundSelector) -> Self {
        ComplexSelector {
            components: vec![SelectorComponent::Compound(compound)],
        }
    }

    pub fn compounds(&self) -> impl Iterator<Item = &CompoundSelector> {
        self.components.iter().filter_map(|c| match c {
            SelectorComponent::Compound(c) => Some(c),
            SelectorComponent::Combinator(_) => None,
        })
    }

    pub fn last_compound(&self) -> Option<&CompoundSelector> {
        match self.components.last() {
            Some(SelectorComponent::Compound(c)) => Some(c),
            _ => None,
        }
    }

    pub fn has_parent_ref(&self) -> bool {
        self.compounds().any(|c| c.has_parent_ref())
    }

    pub fn has_placeholder(&self) -> bool {
        self.compounds()
            .any(|c| c.simples.iter().any(|s| matches!(s, SimpleSelector::Placeholder(_))))
    }

    pub fn starts_with_combinator(&self) -> bool {
        matches!(self.components.first(), Some(SelectorComponent::Combinator(_)))
    }
}

impl CompoundSelector {
    pub fn new(simples: Vec<SimpleSelector>) -> Self {
        CompoundSelector { simples }
    }

    pub fn has_parent_ref(&self) -> bool {
        self.simples.iter().any(|s| match s {
            SimpleSelector::Parent { .. } => true,
            SimpleSelector::Pseudo {
                argument: Some(PseudoArgument::Selector(list)),
                ..
            } => list.has_parent_ref(),
            SimpleSelector::Pseudo {
                argument: Some(PseudoArgument::Nth { of: Some(list), .. }),
                ..
            } => list.has_parent_ref(),
            _ => false,
        })
    }
}

impl SimpleSelector {
    pub fn is_type_like(&self) -> bool {
        matches!(self, SimpleSelector::Type(_) | SimpleSelector::Universal(_))
    }

    pub fn is_pseudo_element(&self) -> bool {
        matches!(self, SimpleSelector::Pseudo { element: true, .. })
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, sel) in self.selectors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", sel)?;
        }
        Ok(())
    }
}

impl fmt::Display for ComplexSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match component {
                SelectorComponent::Compound(c) => write!(f, "{}", c)?,
                SelectorComponent::Combinator(c) => write!(f, "{}", c.symbol())?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for CompoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for simple in &self.simples {
            write!(f, "{}", simple)?;
        }
        Ok(())
    }
}

impl fmt::Display for SimpleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleSelector::Parent { suffix } => {
                write!(f, "&")?;
                if let Some(suffix) = suffix {
                    write!(f, "{}", suffix)?;
                }
                Ok(())
            }
            SimpleSelector::Universal(ns) => write!(f, "{}*", ns),
            SimpleSelector::Type(name) => write!(f, "{}", name),
            SimpleSelector::Class(name) => write!(f, ".{}", name),
            SimpleSelector::Id(name) => write!(f, "#{}", name),
            SimpleSelector::Placeholder(name) => write!(f, "%{}", name),
            SimpleSelector::Attribute(text) => write!(f, "{}", text),
            SimpleSelector::Pseudo {
                name,
                element,
                argument,
            } => {
                write!(f, "{}{}", if *element { "::" } else { ":" }, name)?;
                match argument {
                    None => Ok(()),
                    Some(PseudoArgument::Selector(list)) => write!(f, "({})", list),
                    Some(PseudoArgument::Nth { formula, of }) => match of {
                        Some(list) => write!(f, "({} of {})", formula, list),
                        None => write!(f, "({})", formula),
                    },
                    Some(PseudoArgument::Raw(raw)) => write!(f, "({})", raw),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_compounds_and_combinators() {
        let sel = ComplexSelector {
            components: vec![
                SelectorComponent::Compound(CompoundSelector::new(vec![
                    SimpleSelector::Type("ul".into()),
                    SimpleSelector::Class("nav".into()),
                ])),
                SelectorComponent::Combinator(Combinator::Child),
                SelectorComponent::Compound(CompoundSelector::new(vec![SimpleSelector::Pseudo {
                    name: "not".into(),
                    element: false,
                    argument: Some(PseudoArgument::Selector(SelectorList::new(vec![
                        ComplexSelector::from_compound(CompoundSelector::new(vec![
                            SimpleSelector::Class("x".into()),
                        ])),
                    ]))),
                }])),
            ],
        };
        assert_eq!(sel.to_string(), "ul.nav > :not(.x)");
    }

    #[test]
    fn parent_ref_inside_pseudo_is_detected() {
        let inner = SelectorList::new(vec![ComplexSelector::from_compound(
            CompoundSelector::new(vec![SimpleSelector::Parent { suffix: None }]),
        )]);
        let compound = CompoundSelector::new(vec![SimpleSelector::Pseudo {
            name: "not".into(),
            element: false,
            argument: Some(PseudoArgument::Selector(inner)),
        }]);
        assert!(compound.has_parent_ref());
    }
}
