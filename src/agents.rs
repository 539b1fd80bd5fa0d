//! Built-in agent catalogue
//!
//! The agents the backend is known to host. Not every catalogued agent has a
//! submission strategy; submitting to one without a strategy fails with a
//! configuration error.

use serde::Serialize;

use crate::session::strategy::{COMICS_AGENT, CONTENT_AGENT, XIAOHONGSHU_AGENT};

/// Catalogue entry for one backend agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    /// Identifier sent as the assistant id
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Category shown next to the name
    pub category: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Free-form tags
    pub tags: &'static [&'static str],
    /// Rating out of five
    pub rating: u8,
}

/// Every agent the front end offers, in display order.
pub const CATALOGUE: &[AgentInfo] = &[
    AgentInfo {
        id: CONTENT_AGENT,
        name: "Article writer",
        category: "content / marketing",
        description: "Summarises a subtitle file and writes a long-form article from it.",
        tags: &["copywriting", "articles"],
        rating: 5,
    },
    AgentInfo {
        id: XIAOHONGSHU_AGENT,
        name: "Social post writer",
        category: "content / marketing",
        description: "Proposes topics, lets you pick one, then writes a short social post.",
        tags: &["social", "copywriting"],
        rating: 5,
    },
    AgentInfo {
        id: COMICS_AGENT,
        name: "Comic creator",
        category: "comics / content",
        description: "Turns a description into an outline, a storyboard and panel images.",
        tags: &["comics", "creative"],
        rating: 4,
    },
    AgentInfo {
        id: "service",
        name: "Novel writer",
        category: "content / fiction",
        description: "Writes a novel from an outline.",
        tags: &["fiction", "creative"],
        rating: 4,
    },
];

/// Looks up a catalogued agent by id.
pub fn find(id: &str) -> Option<&'static AgentInfo> {
    CATALOGUE.iter().find(|agent| agent.id == id)
}
