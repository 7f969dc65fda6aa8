use serde::Serialize;
use std::fmt;

/// The closed set of concrete node kinds.
///
/// Abstract kinds (`Document`, `PathElement`, `ClassSpec`) only appear as
/// ancestors; see [`NodeKind::is_a`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKind {
    PlanSchema,
    PlanLibrary,
    Plan,
    Station,
    Segment,
    Command,
    ParamSpec,
    CommandSpec,
    Site,
    Platform,
    Target,
    UnitSpec,
}

impl NodeKind {
    pub const ALL: [NodeKind; 12] = [
        NodeKind::PlanSchema,
        NodeKind::PlanLibrary,
        NodeKind::Plan,
        NodeKind::Station,
        NodeKind::Segment,
        NodeKind::Command,
        NodeKind::ParamSpec,
        NodeKind::CommandSpec,
        NodeKind::Site,
        NodeKind::Platform,
        NodeKind::Target,
        NodeKind::UnitSpec,
    ];

    /// Decode a `type` discriminator.
    ///
    /// `Command` is not decoded here: command objects carry their command
    /// spec id as `type` and are recognized through the schema.
    pub fn from_type_name(name: &str) -> Option<NodeKind> {
        match name {
            "PlanSchema" => Some(NodeKind::PlanSchema),
            "PlanLibrary" => Some(NodeKind::PlanLibrary),
            "Plan" => Some(NodeKind::Plan),
            "Station" => Some(NodeKind::Station),
            "Segment" => Some(NodeKind::Segment),
            "ParamSpec" => Some(NodeKind::ParamSpec),
            "CommandSpec" => Some(NodeKind::CommandSpec),
            "Site" => Some(NodeKind::Site),
            "Platform" => Some(NodeKind::Platform),
            "Target" => Some(NodeKind::Target),
            "UnitSpec" => Some(NodeKind::UnitSpec),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::PlanSchema => "PlanSchema",
            NodeKind::PlanLibrary => "PlanLibrary",
            NodeKind::Plan => "Plan",
            NodeKind::Station => "Station",
            NodeKind::Segment => "Segment",
            NodeKind::Command => "Command",
            NodeKind::ParamSpec => "ParamSpec",
            NodeKind::CommandSpec => "CommandSpec",
            NodeKind::Site => "Site",
            NodeKind::Platform => "Platform",
            NodeKind::Target => "Target",
            NodeKind::UnitSpec => "UnitSpec",
        }
    }

    /// The abstract kind this kind derives from, if any.
    pub fn abstract_parent(self) -> Option<&'static str> {
        match self {
            NodeKind::PlanSchema | NodeKind::PlanLibrary | NodeKind::Plan => Some("Document"),
            NodeKind::Station | NodeKind::Segment => Some("PathElement"),
            NodeKind::CommandSpec => Some("ClassSpec"),
            _ => None,
        }
    }

    pub fn is_a(self, name: &str) -> bool {
        self.name() == name || self.abstract_parent() == Some(name)
    }

    pub fn is_document(self) -> bool {
        self.abstract_parent() == Some("Document")
    }

    pub fn is_path_element(self) -> bool {
        self.abstract_parent() == Some("PathElement")
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_round_trips_every_kind_but_command() {
        for kind in NodeKind::ALL {
            let decoded = NodeKind::from_type_name(kind.name());
            if kind == NodeKind::Command {
                assert_eq!(decoded, None);
            } else {
                assert_eq!(decoded, Some(kind));
            }
        }
    }

    #[test]
    fn abstract_ancestry() {
        assert!(NodeKind::Station.is_a("PathElement"));
        assert!(NodeKind::Plan.is_a("Document"));
        assert!(NodeKind::CommandSpec.is_a("ClassSpec"));
        assert!(!NodeKind::Site.is_a("Document"));
        assert!(NodeKind::Command.is_a("Command"));
    }
}
