//! If/elif/else ladders (spec §4.H).

use std::rc::Rc;

use crate::point::SourceSpan;

/// One arm of a ladder. `condition` is `None` for the `!else` arm, which is
/// always taken if execution reaches it.
#[derive(Debug, Clone)]
pub struct LadderArm {
    pub condition: Option<Rc<str>>,
    pub point: SourceSpan,
}

/// A sequence of `!if`/`!elif`/`!else` arms over the same enclosing mapping.
/// Identity is the arena's [`crate::value::LadderId`]; that identity is
/// preserved across cloning so an `IfLadderItem` deferred can still find its
/// live ladder after the enclosing tuple has been cloned or composited
/// (spec §4.G step 3).
#[derive(Debug, Clone)]
pub struct Ladder {
    pub arms: Vec<LadderArm>,
    pub has_else: bool,
}

impl Ladder {
    pub fn new() -> Self {
        Self { arms: Vec::new(), has_else: false }
    }

    /// The arm index selected when no condition is true: the else arm's
    /// index if present, otherwise "no arm" (spec §4.B "IfLadderIndex").
    pub fn else_index(&self) -> Option<usize> {
        if self.has_else {
            Some(self.arms.len() - 1)
        } else {
            None
        }
    }
}

impl Default for Ladder {
    fn default() -> Self {
        Self::new()
    }
}
