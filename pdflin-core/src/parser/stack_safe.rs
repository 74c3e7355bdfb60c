//! Stack-safe traversal utilities
//!
//! Deeply nested or cyclic object graphs must not overflow the stack or loop
//! forever. [`StackSafeContext`] tracks the current depth and the references
//! on the active path so traversals can cut cycles and bail out early.

use super::objects::ObjectId;
use super::{ParseError, ParseResult};
use std::collections::HashSet;

/// Maximum recursion depth for traversal operations
pub const MAX_RECURSION_DEPTH: usize = 1000;

/// Stack-safe traversal context
#[derive(Debug)]
pub struct StackSafeContext {
    /// Current recursion depth
    pub depth: usize,
    /// Maximum allowed depth
    pub max_depth: usize,
    /// References on the active path
    pub visited_refs: HashSet<ObjectId>,
}

impl Default for StackSafeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl StackSafeContext {
    /// Create a new stack-safe context
    pub fn new() -> Self {
        Self::with_max_depth(MAX_RECURSION_DEPTH)
    }

    /// Create a new context with a custom depth limit
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited_refs: HashSet::new(),
        }
    }

    /// Enter a new recursion level
    pub fn enter(&mut self) -> ParseResult<()> {
        if self.depth + 1 > self.max_depth {
            return Err(ParseError::malformed(
                0,
                format!(
                    "maximum recursion depth exceeded: {} (limit: {})",
                    self.depth + 1,
                    self.max_depth
                ),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Exit a recursion level
    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Mark a reference as being processed; fails if it already is
    pub fn visit_ref(&mut self, id: ObjectId) -> ParseResult<()> {
        if !self.visited_refs.insert(id) {
            return Err(ParseError::CircularReference(id.number(), id.generation()));
        }
        Ok(())
    }

    /// Mark a reference as no longer being processed
    pub fn unvisit_ref(&mut self, id: ObjectId) {
        self.visited_refs.remove(&id);
    }

    pub fn is_visiting(&self, id: ObjectId) -> bool {
        self.visited_refs.contains(&id)
    }
}
