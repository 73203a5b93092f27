//! The three routing modes a table action can take to reach its owning
//! partition (spec.md §4.E "Routing modes", §9: "Combiner + delegate +
//! direct build-time choice... implement as a runtime enum dispatch").

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// The caller already is the partition's owner thread; run inline.
    /// Spec's recommended default (§9: "simplest").
    Direct,
    /// Post the action to the owner's inbox; block until it completes.
    Delegate,
    /// Enqueue on the partition's combining ring; whoever holds the
    /// ticket drains a batch under one critical section.
    Combine,
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatchMode::Direct => "direct",
            DispatchMode::Delegate => "delegate",
            DispatchMode::Combine => "combine",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DispatchMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(DispatchMode::Direct),
            "delegate" => Ok(DispatchMode::Delegate),
            "combine" => Ok(DispatchMode::Combine),
            other => Err(format!("unknown dispatch mode '{other}' (expected direct|delegate|combine)")),
        }
    }
}
