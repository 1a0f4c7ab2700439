//! Sample schedule
//!
//! Each supported group of a station gets a table of `n` rows by
//! `columns` columns, where `n` is the number of coding indices the peer
//! supports. Every column holds a random permutation of `0..n`. Sampling walks
//! the table row by row and moves to the next column when a column is used
//! up, so over time every coding index is visited equally often but in no
//! predictable order.

use rand::Rng;

/// Per-group permutation table plus its read cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable {
    rows: usize,
    columns: usize,
    /// Row-major cells
    cells: Vec<u8>,
    row: usize,
    col: usize,
}

impl SampleTable {
    /// Generate a table for `rows` coding indices.
    ///
    /// Each entry is placed by drawing a slot uniformly and probing forward to
    /// the next free one.
    pub fn generate<R: Rng + ?Sized>(rows: usize, columns: usize, rng: &mut R) -> Self {
        assert!(rows > 0, "sample table needs at least one coding index");
        assert!(columns > 0, "sample table needs at least one column");

        let mut cells = vec![0u8; rows * columns];
        let mut used = vec![false; rows];
        for col in 0..columns {
            used.iter_mut().for_each(|u| *u = false);
            for value in 0..rows {
                let mut slot = rng.gen_range(0..=rows) % rows;
                while used[slot] {
                    slot = (slot + 1) % rows;
                }
                used[slot] = true;
                cells[slot * columns + col] = value as u8;
            }
        }

        Self {
            rows,
            columns,
            cells,
            row: 0,
            col: 0,
        }
    }

    /// Number of rows (supported coding indices)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Cell at (row, column)
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.columns + col]
    }

    /// One column, top to bottom
    pub fn column(&self, col: usize) -> Vec<u8> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    /// Coding index under the cursor
    pub fn current(&self) -> u8 {
        self.get(self.row, self.col)
    }

    /// Cursor as (row, column)
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Move the cursor one row down, wrapping into the next column.
    pub fn advance(&mut self) {
        self.row += 1;
        if self.row >= self.rows {
            self.row = 0;
            self.col += 1;
            if self.col >= self.columns {
                self.col = 0;
            }
        }
    }

    /// Render the table as tab-separated rows
    pub fn report(&self) -> String {
        let mut out = String::new();
        for row in 0..self.rows {
            for col in 0..self.columns {
                out.push_str(&self.get(row, col).to_string());
                out.push('\t');
            }
            out.push('\n');
        }
        out
    }
}
