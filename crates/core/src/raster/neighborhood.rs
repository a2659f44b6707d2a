//! Moving-window shapes for focal filters

use serde::{Deserialize, Serialize};

/// Window around a cell, centre included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Neighborhood {
    /// 3x3 square
    #[default]
    Queen3x3,
    /// Square of half-width `r`, i.e. (2r+1) x (2r+1)
    Square(usize),
    /// Disc of radius `r` cells
    Circle(usize),
}

impl Neighborhood {
    /// Half-width of the bounding square
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 => 1,
            Neighborhood::Square(r) | Neighborhood::Circle(r) => *r,
        }
    }

    fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Queen3x3 | Neighborhood::Square(_) => true,
            Neighborhood::Circle(r) => {
                let r = *r as isize;
                dr * dr + dc * dc <= r * r
            }
        }
    }

    /// Relative (row, col) offsets in row-major order
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| self.contains(dr, dc))
            .collect()
    }
}
