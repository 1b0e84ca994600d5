//! Bounded scrollback: the retained history of rendered lines.
//!
//! Append-only FIFO over display lines. When the buffer is full the
//! oldest line falls off the front, so memory stays bounded no matter
//! how long a session runs.

use std::collections::VecDeque;

use crate::wrap::DisplayLine;

/// Default retained line count.
pub const DEFAULT_SCROLLBACK_LINES: usize = 5000;

#[derive(Debug, Clone)]
pub struct ScrollbackBuffer {
    lines: VecDeque<DisplayLine>,
    capacity: usize,
}

impl ScrollbackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_SCROLLBACK_LINES)),
            capacity,
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a line, evicting the oldest if the buffer is full.
    pub fn push(&mut self, line: DisplayLine) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Lines from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &DisplayLine> {
        self.lines.iter()
    }

    #[allow(dead_code)]
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK_LINES)
    }
}
