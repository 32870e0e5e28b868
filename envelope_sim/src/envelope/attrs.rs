//! Metadata attached to envelope parts.
//!
//! Attributes form a closed registry: every attribute has an [`AttrKind`], and a set of
//! attributes holds at most one attribute of each kind.

use serde::{Deserialize, Serialize};

/// What the train is doing along a part.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeProfile {
    Accelerating,
    ConstantSpeed,
    Coasting,
    Braking,
    CatchingUp,
}

/// Marks the braking curve leading to the stop with this index.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StopMeta {
    pub index: usize,
}

/// Where a speed limit comes from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum LimitSource {
    /// The rolling stock's own maximum speed.
    TrainLimit,
    /// A speed section of the infrastructure.
    SpeedSection(String),
    /// The cruise speed chosen by a MARECO allowance.
    MarecoSpeedLimit,
    /// The lowest speed tolerated by capacity constraints.
    CapacitySpeedLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrKind {
    Profile,
    Stop,
    LimitSource,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeAttr {
    Profile(EnvelopeProfile),
    Stop(StopMeta),
    LimitSource(LimitSource),
}

impl EnvelopeAttr {
    pub fn kind(&self) -> AttrKind {
        match self {
            EnvelopeAttr::Profile(_) => AttrKind::Profile,
            EnvelopeAttr::Stop(_) => AttrKind::Stop,
            EnvelopeAttr::LimitSource(_) => AttrKind::LimitSource,
        }
    }
}

impl From<EnvelopeProfile> for EnvelopeAttr {
    fn from(profile: EnvelopeProfile) -> Self {
        EnvelopeAttr::Profile(profile)
    }
}

impl From<StopMeta> for EnvelopeAttr {
    fn from(meta: StopMeta) -> Self {
        EnvelopeAttr::Stop(meta)
    }
}

impl From<LimitSource> for EnvelopeAttr {
    fn from(source: LimitSource) -> Self {
        EnvelopeAttr::LimitSource(source)
    }
}

/// A set of attributes, keeping at most one per [`AttrKind`], sorted by kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EnvelopeAttrs(Vec<EnvelopeAttr>);

impl EnvelopeAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute, replacing any other attribute of the same kind.
    pub fn set(&mut self, attr: impl Into<EnvelopeAttr>) {
        let attr = attr.into();
        let kind = attr.kind();
        match self.0.binary_search_by_key(&kind, EnvelopeAttr::kind) {
            Ok(index) => self.0[index] = attr,
            Err(index) => self.0.insert(index, attr),
        }
    }

    pub fn with(mut self, attr: impl Into<EnvelopeAttr>) -> Self {
        self.set(attr);
        self
    }

    pub fn get(&self, kind: AttrKind) -> Option<&EnvelopeAttr> {
        self.0
            .binary_search_by_key(&kind, EnvelopeAttr::kind)
            .ok()
            .map(|index| &self.0[index])
    }

    pub fn has(&self, attr: &EnvelopeAttr) -> bool {
        self.get(attr.kind()) == Some(attr)
    }

    pub fn profile(&self) -> Option<EnvelopeProfile> {
        match self.get(AttrKind::Profile) {
            Some(EnvelopeAttr::Profile(profile)) => Some(*profile),
            _ => None,
        }
    }

    pub fn stop(&self) -> Option<StopMeta> {
        match self.get(AttrKind::Stop) {
            Some(EnvelopeAttr::Stop(meta)) => Some(*meta),
            _ => None,
        }
    }

    pub fn limit_source(&self) -> Option<&LimitSource> {
        match self.get(AttrKind::LimitSource) {
            Some(EnvelopeAttr::LimitSource(source)) => Some(source),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnvelopeAttr> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<A: Into<EnvelopeAttr>> FromIterator<A> for EnvelopeAttrs {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        let mut attrs = EnvelopeAttrs::new();
        for attr in iter {
            attrs.set(attr);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_attr_per_kind() {
        let mut attrs = EnvelopeAttrs::new()
            .with(EnvelopeProfile::Braking)
            .with(StopMeta { index: 2 });
        attrs.set(EnvelopeProfile::Coasting);
        assert_eq!(attrs.iter().count(), 2);
        assert_eq!(attrs.profile(), Some(EnvelopeProfile::Coasting));
        assert_eq!(attrs.stop(), Some(StopMeta { index: 2 }));
        assert_eq!(attrs.limit_source(), None);
        assert!(attrs.has(&EnvelopeAttr::Profile(EnvelopeProfile::Coasting)));
        assert!(!attrs.has(&EnvelopeAttr::Profile(EnvelopeProfile::Braking)));
    }

    #[test]
    fn test_attrs_are_sorted_by_kind() {
        let a: EnvelopeAttrs = vec![
            EnvelopeAttr::from(LimitSource::TrainLimit),
            EnvelopeAttr::from(EnvelopeProfile::ConstantSpeed),
        ]
        .into_iter()
        .collect();
        let b = EnvelopeAttrs::new()
            .with(EnvelopeProfile::ConstantSpeed)
            .with(LimitSource::TrainLimit);
        assert_eq!(a, b);
    }
}
