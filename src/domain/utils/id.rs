use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::ConversionError;

/// Separator between the two routers of a link or flow identifier, and between routers of a path.
pub const ENDPOINT_DELIMITER: char = ';';

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Id<T> {
    pub id: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Id { id: id.into(), _marker: PhantomData }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: {:?}", display_name, self.id)
    }
}

/// An ordered pair of routers.
///
/// Links are keyed by `(start, end)` and flows by `(source, dest)`. Both render as `start;end`,
/// using an explicit delimiter instead of concatenating fixed-width router names.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct EndpointPair<T> {
    pub start: RouterId,
    pub end: RouterId,
    _marker: PhantomData<T>,
}

impl<T> EndpointPair<T> {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        EndpointPair { start: RouterId::new(start), end: RouterId::new(end), _marker: PhantomData }
    }

    pub fn from_routers(start: RouterId, end: RouterId) -> Self {
        EndpointPair { start, end, _marker: PhantomData }
    }

    pub fn is_self_loop(&self) -> bool {
        self.start == self.end
    }
}

impl<T> fmt::Display for EndpointPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.start, ENDPOINT_DELIMITER, self.end)
    }
}

impl<T> fmt::Debug for EndpointPair<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: \"{}\"", display_name, self)
    }
}

impl<T> FromStr for EndpointPair<T> {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(ENDPOINT_DELIMITER);

        match (parts.next(), parts.next(), parts.next()) {
            (Some(start), Some(end), None) if !start.trim().is_empty() && !end.trim().is_empty() => {
                Ok(EndpointPair::new(start.trim(), end.trim()))
            }
            _ => Err(ConversionError::MalformedEndpointPair(s.to_string())),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct RouterTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct LinkTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct FlowTag;

pub type RouterId = Id<RouterTag>;
pub type LinkId = EndpointPair<LinkTag>;
pub type FlowId = EndpointPair<FlowTag>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_pair_round_trips_through_display() {
        let link: LinkId = "R1004;R1993".parse().unwrap();

        assert_eq!(link.start, RouterId::new("R1004"));
        assert_eq!(link.end, RouterId::new("R1993"));
        assert_eq!(link.to_string(), "R1004;R1993");
    }

    #[test]
    fn test_endpoint_pair_rejects_missing_delimiter() {
        // Fixed-width concatenation is not accepted as an identifier.
        let parsed = "R1004R1993".parse::<FlowId>();

        assert_eq!(parsed, Err(ConversionError::MalformedEndpointPair("R1004R1993".to_string())));
        assert!("A;B;C".parse::<FlowId>().is_err());
        assert!(";B".parse::<FlowId>().is_err());
    }

    #[test]
    fn test_debug_output_names_the_id_kind() {
        let flow = FlowId::new("A", "G");

        assert_eq!(format!("{:?}", flow), "FlowId: \"A;G\"");
        assert_eq!(format!("{:?}", RouterId::new("A")), "RouterId: \"A\"");
        assert!(flow.to_string().contains(ENDPOINT_DELIMITER));
        assert!(!flow.is_self_loop());
    }
}
