//! Administrative dumps of the routing graph.
//!
//! Rows are serializable so the host can emit them as JSON; the text helpers
//! produce the fixed-width console form.

use crate::class::{ClassReplicationInfo, RoutingCategory};
use crate::rep_list::ActorRepList;
use serde::Serialize;
use std::fmt::Write as _;

/// One stored class -> category entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingRow {
    pub class: String,
    pub parent: Option<String>,
    pub category: RoutingCategory,
}

/// One stored class -> info entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfoRow {
    pub class: String,
    pub parent: Option<String>,
    pub explicit: bool,
    pub cull_distance: f64,
    pub replication_period_frame: u32,
    pub distance_priority_scale: f32,
    pub starvation_priority_scale: f32,
    pub channel_frame_timeout: u32,
    pub fast_shared_path: Option<String>,
    /// Settings that differ from the defaults
    pub delta: String,
}

impl ClassInfoRow {
    pub(crate) fn new(
        class: String,
        parent: Option<String>,
        explicit: bool,
        info: &ClassReplicationInfo,
    ) -> Self {
        Self {
            class,
            parent,
            explicit,
            cull_distance: info.cull_distance(),
            replication_period_frame: info.replication_period_frame,
            distance_priority_scale: info.distance_priority_scale,
            starvation_priority_scale: info.starvation_priority_scale,
            channel_frame_timeout: info.channel_frame_timeout,
            fast_shared_path: info.fast_shared_path.map(|path| path.name.to_string()),
            delta: info.debug_string_delta(),
        }
    }
}

const BANNER: &str = "====================================";

/// Console form of the routing table.
pub fn format_routing_table(rows: &[RoutingRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BANNER}");
    let _ = writeln!(out, "Replication Routing Policies");
    let _ = writeln!(out, "{BANNER}");
    for row in rows {
        let _ = writeln!(out, "{:<40} --> {}", row.class, row.category);
    }
    out
}

/// Console form of the class info table.
pub fn format_class_info_table(rows: &[ClassInfoRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{BANNER}");
    let _ = writeln!(out, "Class Settings Map");
    let _ = writeln!(out, "{BANNER}");
    for row in rows {
        let parent = row.parent.as_deref().unwrap_or("None");
        let _ = writeln!(out, "  {} ({}) -> {}", row.class, parent, row.delta);
    }
    out
}

/// Indented text builder used by node dumps.
#[derive(Debug, Default)]
pub struct NodeDebugLog {
    lines: Vec<String>,
    indent: usize,
}

impl NodeDebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, line: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", "  ".repeat(self.indent), line.as_ref()));
    }

    pub fn push_indent(&mut self) {
        self.indent += 1;
    }

    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Logs `name` followed by the list contents on one line.
    pub fn log_rep_list(&mut self, name: &str, list: &ActorRepList) {
        if list.is_empty() {
            return;
        }
        let members: Vec<String> = list.iter().map(|e| e.0.to_string()).collect();
        self.log(format!("{} [{}]: {}", name, list.len(), members.join(" ")));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_string(self) -> String {
        self.lines.join("\n")
    }
}
