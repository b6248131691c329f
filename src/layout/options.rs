use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Down,
    Right,
    Up,
    Left,
}

impl Direction {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "DOWN" | "TB" | "TD" => Some(Self::Down),
            "RIGHT" | "LR" => Some(Self::Right),
            "UP" | "BT" => Some(Self::Up),
            "LEFT" | "RL" => Some(Self::Left),
            _ => None,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Right | Self::Left)
    }

    pub(crate) fn rankdir(self) -> &'static str {
        match self {
            Self::Down => "tb",
            Self::Up => "bt",
            Self::Right => "lr",
            Self::Left => "rl",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyHandling {
    /// Edges between nested descendants take part in every enclosing level.
    #[default]
    IncludeChildren,
    /// Each group is laid out from its own edges only.
    SeparateChildren,
    /// Use the enclosing run's setting.
    Inherit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleBreaking {
    #[default]
    Greedy,
    DepthFirst,
    Interactive,
    /// Keep children in document order inside their rank.
    ModelOrder,
}

/// Spacing classes in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Spacing {
    pub node_node: f32,
    pub node_node_between_layers: f32,
    pub edge_node: f32,
    pub edge_node_between_layers: f32,
    pub edge_edge: f32,
    pub edge_edge_between_layers: f32,
}

impl Default for Spacing {
    fn default() -> Self {
        Self {
            node_node: 60.0,
            node_node_between_layers: 80.0,
            edge_node: 20.0,
            edge_node_between_layers: 24.0,
            edge_edge: 12.0,
            edge_edge_between_layers: 12.0,
        }
    }
}

/// Options for one layout run. Always passed in explicitly; nothing here is
/// global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    pub spacing: Spacing,
    pub direction: Direction,
    pub hierarchy_handling: HierarchyHandling,
    pub cycle_breaking: CycleBreaking,
    /// Inner padding of a group box on every side.
    pub group_padding: f32,
    /// Extra room above a group's children for its title.
    pub group_header: f32,
    /// Outer margin dagre keeps around each level.
    pub margin: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            spacing: Spacing::default(),
            direction: Direction::Down,
            hierarchy_handling: HierarchyHandling::IncludeChildren,
            cycle_breaking: CycleBreaking::Greedy,
            group_padding: 24.0,
            group_header: 28.0,
            margin: 8.0,
        }
    }
}

impl LayoutOptions {
    /// `Inherit` resolves to the default handling at the top of a run.
    pub fn effective_hierarchy(&self) -> HierarchyHandling {
        match self.hierarchy_handling {
            HierarchyHandling::Inherit => HierarchyHandling::IncludeChildren,
            other => other,
        }
    }
}
