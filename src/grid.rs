use std::fmt;

use crate::error::{Error, Result};

/// Position of a grid reader over a multi-result cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    /// Grid `i` is next and has not been read.
    Active(usize),
    /// Grid `i` is being or has been read; the cursor has not moved on yet.
    Consumed(usize),
    /// No further grids, or the cursor failed.
    Disposed,
}

impl fmt::Display for GridState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridState::Active(grid) => write!(f, "Active({})", grid),
            GridState::Consumed(grid) => write!(f, "Consumed({})", grid),
            GridState::Disposed => f.write_str("Disposed"),
        }
    }
}

impl GridState {
    /// Start reading `grid`. Grids are read once, in increasing order.
    pub(crate) fn begin(&mut self, grid: usize) -> Result<()> {
        match *self {
            GridState::Disposed => Err(Error::ObjectDisposed),
            GridState::Active(current) if current == grid => {
                *self = GridState::Consumed(grid);
                Ok(())
            }
            state => Err(Error::OutOfOrderAccess {
                requested: grid,
                current: state.to_string(),
            }),
        }
    }

    /// The next grid index, for implicit reads.
    pub(crate) fn next_grid(self) -> Result<usize> {
        match self {
            GridState::Active(grid) => Ok(grid),
            GridState::Consumed(grid) => Err(Error::OutOfOrderAccess {
                requested: grid + 1,
                current: self.to_string(),
            }),
            GridState::Disposed => Err(Error::ObjectDisposed),
        }
    }

    /// Record the outcome of advancing the cursor past `grid`.
    pub(crate) fn advanced(&mut self, grid: usize, more: bool) {
        *self = if more {
            GridState::Active(grid + 1)
        } else {
            GridState::Disposed
        };
    }

    pub fn grid_index(self) -> Option<usize> {
        match self {
            GridState::Active(grid) | GridState::Consumed(grid) => Some(grid),
            GridState::Disposed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grids_are_read_in_order() {
        let mut state = GridState::Active(0);
        state.begin(0).unwrap();
        assert_eq!(state, GridState::Consumed(0));
        assert!(matches!(
            state.begin(0),
            Err(Error::OutOfOrderAccess { requested: 0, .. })
        ));
        state.advanced(0, true);
        assert_eq!(state, GridState::Active(1));
        assert!(matches!(
            state.begin(0),
            Err(Error::OutOfOrderAccess { requested: 0, .. })
        ));
        assert!(matches!(
            state.begin(2),
            Err(Error::OutOfOrderAccess { requested: 2, .. })
        ));
        state.begin(1).unwrap();
        state.advanced(1, false);
        assert_eq!(state, GridState::Disposed);
        assert!(matches!(state.begin(2), Err(Error::ObjectDisposed)));
        assert!(matches!(state.next_grid(), Err(Error::ObjectDisposed)));
    }
}
