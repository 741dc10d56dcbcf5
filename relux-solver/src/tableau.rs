//! Arena-backed sparse tableau.
//!
//! The tableau stores the linear equations `x_basic = Σ c_j · x_j` as a
//! sparse matrix in which every nonzero cell belongs to two doubly linked
//! lists, one per row and one per column. Entries live in an arena indexed
//! by integer handles; erasing an entry pushes its handle onto a free list
//! for reuse, so repeated pivoting does not grow the arena without bound.
//!
//! Callers maintain the tableau-form invariant: each basic variable is
//! pinned by a `(b, b)` self-cell of exactly `-1`, and cells whose value
//! falls within the zero tolerance are removed rather than stored.

use relux_core::float;
use relux_core::Var;
use rustc_hash::FxHashMap;

/// Handle into the entry arena.
type EntryId = usize;

/// Sentinel for "no entry".
const NIL: EntryId = usize::MAX;

#[derive(Debug, Clone)]
struct Entry {
    row: Var,
    column: Var,
    value: f64,
    next_in_row: EntryId,
    prev_in_row: EntryId,
    next_in_column: EntryId,
    prev_in_column: EntryId,
}

/// Sparse matrix with doubly linked rows and columns.
#[derive(Debug, Clone)]
pub struct SparseTableau {
    size: usize,
    entries: Vec<Entry>,
    free: Vec<EntryId>,
    rows: Vec<EntryId>,
    columns: Vec<EntryId>,
    row_size: Vec<usize>,
    column_size: Vec<usize>,
    epsilon: f64,
}

impl SparseTableau {
    /// An empty tableau over `size` variables. `epsilon` is the zero
    /// tolerance below which cells are dropped.
    #[must_use]
    pub fn new(size: usize, epsilon: f64) -> Self {
        Self {
            size,
            entries: Vec::new(),
            free: Vec::new(),
            rows: vec![NIL; size],
            columns: vec![NIL; size],
            row_size: vec![0; size],
            column_size: vec![0; size],
            epsilon,
        }
    }

    /// Number of variables this tableau spans.
    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.size
    }

    /// Total number of stored cells.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.row_size.iter().sum()
    }

    /// Does row `row` contain any cells?
    #[must_use]
    pub fn active_row(&self, row: Var) -> bool {
        self.rows[row] != NIL
    }

    /// Does column `column` contain any cells?
    #[must_use]
    pub fn active_column(&self, column: Var) -> bool {
        self.columns[column] != NIL
    }

    /// Number of cells in `row`.
    #[must_use]
    pub fn row_size(&self, row: Var) -> usize {
        self.row_size[row]
    }

    /// Number of cells in `column`.
    #[must_use]
    pub fn column_size(&self, column: Var) -> usize {
        self.column_size[column]
    }

    /// Cell lookup; zero when absent. O(row length).
    #[must_use]
    pub fn get(&self, row: Var, column: Var) -> f64 {
        let mut id = self.rows[row];
        while id != NIL {
            let entry = &self.entries[id];
            if entry.column == column {
                return entry.value;
            }
            id = entry.next_in_row;
        }
        0.0
    }

    /// Remove every cell.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free.clear();
        self.rows.fill(NIL);
        self.columns.fill(NIL);
        self.row_size.fill(0);
        self.column_size.fill(0);
    }

    fn alloc(&mut self, entry: Entry) -> EntryId {
        if let Some(id) = self.free.pop() {
            self.entries[id] = entry;
            id
        } else {
            self.entries.push(entry);
            self.entries.len() - 1
        }
    }

    /// Insert a cell assumed not to exist yet. Values within the zero
    /// tolerance are ignored.
    pub fn add_entry(&mut self, row: Var, column: Var, value: f64) {
        if float::is_zero_eps(value, self.epsilon) {
            return;
        }

        let id = self.alloc(Entry {
            row,
            column,
            value,
            next_in_row: self.rows[row],
            prev_in_row: NIL,
            next_in_column: self.columns[column],
            prev_in_column: NIL,
        });

        let old_row_head = self.rows[row];
        if old_row_head != NIL {
            self.entries[old_row_head].prev_in_row = id;
        }
        let old_column_head = self.columns[column];
        if old_column_head != NIL {
            self.entries[old_column_head].prev_in_column = id;
        }

        self.rows[row] = id;
        self.columns[column] = id;
        self.row_size[row] += 1;
        self.column_size[column] += 1;
    }

    fn unlink_from_row(&mut self, id: EntryId) {
        let (row, prev, next) = {
            let entry = &self.entries[id];
            (entry.row, entry.prev_in_row, entry.next_in_row)
        };

        if next != NIL {
            self.entries[next].prev_in_row = prev;
        }
        if prev != NIL {
            self.entries[prev].next_in_row = next;
        }
        if self.rows[row] == id {
            self.rows[row] = next;
        }
        self.row_size[row] -= 1;
    }

    fn unlink_from_column(&mut self, id: EntryId) {
        let (column, prev, next) = {
            let entry = &self.entries[id];
            (entry.column, entry.prev_in_column, entry.next_in_column)
        };

        if next != NIL {
            self.entries[next].prev_in_column = prev;
        }
        if prev != NIL {
            self.entries[prev].next_in_column = next;
        }
        if self.columns[column] == id {
            self.columns[column] = next;
        }
        self.column_size[column] -= 1;
    }

    fn erase(&mut self, id: EntryId) {
        self.unlink_from_row(id);
        self.unlink_from_column(id);
        self.free.push(id);
    }

    /// Remove the cell at `(row, column)` if present.
    pub fn erase_entry(&mut self, row: Var, column: Var) {
        let mut id = self.rows[row];
        while id != NIL {
            let entry = &self.entries[id];
            if entry.column == column {
                self.erase(id);
                return;
            }
            id = entry.next_in_row;
        }
    }

    /// Remove every cell in `row`.
    pub fn erase_row(&mut self, row: Var) {
        let mut id = self.rows[row];
        while id != NIL {
            let next = self.entries[id].next_in_row;
            self.unlink_from_column(id);
            self.free.push(id);
            id = next;
        }
        self.rows[row] = NIL;
        self.row_size[row] = 0;
    }

    /// Remove every cell in `column`.
    pub fn erase_column(&mut self, column: Var) {
        let mut id = self.columns[column];
        while id != NIL {
            let next = self.entries[id].next_in_column;
            self.unlink_from_row(id);
            self.free.push(id);
            id = next;
        }
        self.columns[column] = NIL;
        self.column_size[column] = 0;
    }

    /// Collect `(column, value)` pairs of a row.
    #[must_use]
    pub fn row_entries(&self, row: Var) -> Vec<(Var, f64)> {
        let mut result = Vec::with_capacity(self.row_size[row]);
        let mut id = self.rows[row];
        while id != NIL {
            let entry = &self.entries[id];
            result.push((entry.column, entry.value));
            id = entry.next_in_row;
        }
        result
    }

    /// Collect `(row, value)` pairs of a column.
    #[must_use]
    pub fn column_entries(&self, column: Var) -> Vec<(Var, f64)> {
        let mut result = Vec::with_capacity(self.column_size[column]);
        let mut id = self.columns[column];
        while id != NIL {
            let entry = &self.entries[id];
            result.push((entry.row, entry.value));
            id = entry.next_in_column;
        }
        result
    }

    /// `row_target += scale * row_source`, linear in the lengths of the two
    /// rows via a scratch dense map. When `guarantee = (col, val)` is given,
    /// the `(target, col)` cell is forced to exactly `val` instead of the
    /// computed sum; this is how pivoting keeps self-cells at exactly `-1`
    /// and cleared columns at exactly `0`. Cells that end up within the
    /// zero tolerance are removed.
    pub fn add_scaled_row(
        &mut self,
        source: Var,
        scale: f64,
        target: Var,
        guarantee: Option<(Var, f64)>,
    ) {
        if !self.active_row(source) {
            return;
        }

        let mut dense: FxHashMap<Var, EntryId> = FxHashMap::default();
        let mut id = self.rows[target];
        while id != NIL {
            let entry = &self.entries[id];
            dense.insert(entry.column, id);
            id = entry.next_in_row;
        }

        let source_entries = self.row_entries(source);
        for (column, value) in source_entries {
            let guaranteed = match guarantee {
                Some((g_col, g_val)) if g_col == column => Some(g_val),
                _ => None,
            };

            if let Some(&target_id) = dense.get(&column) {
                let new_value = match guaranteed {
                    Some(g_val) => g_val,
                    None => self.entries[target_id].value + value * scale,
                };
                self.entries[target_id].value = new_value;

                if float::is_zero_eps(new_value, self.epsilon) {
                    dense.remove(&column);
                    self.erase(target_id);
                }
            } else {
                let new_value = guaranteed.unwrap_or(value * scale);
                self.add_entry(target, column, new_value);
                if !float::is_zero_eps(new_value, self.epsilon) {
                    dense.insert(column, self.rows[target]);
                }
            }
        }
    }

    /// Merge column `source` into column `target`: cells sharing a row are
    /// summed (and dropped when they cancel), cells without a counterpart
    /// are relinked into the target column. Column `source` is empty
    /// afterwards. Used to identify a dissolved B variable with its F
    /// partner.
    pub fn add_column_erase_source(&mut self, source: Var, target: Var) {
        if !self.active_column(source) {
            return;
        }

        let mut dense: FxHashMap<Var, EntryId> = FxHashMap::default();
        let mut id = self.columns[target];
        while id != NIL {
            let entry = &self.entries[id];
            dense.insert(entry.row, id);
            id = entry.next_in_column;
        }

        let mut id = self.columns[source];
        while id != NIL {
            let next = self.entries[id].next_in_column;
            let row = self.entries[id].row;

            if let Some(&target_id) = dense.get(&row) {
                let new_value = self.entries[target_id].value + self.entries[id].value;
                self.entries[target_id].value = new_value;

                if float::is_zero_eps(new_value, self.epsilon) {
                    dense.remove(&row);
                    self.erase(target_id);
                }
            } else {
                // Steal the entry: relink its column pointers only.
                self.unlink_from_column(id);
                let target_head = self.columns[target];
                {
                    let entry = &mut self.entries[id];
                    entry.column = target;
                    entry.next_in_column = target_head;
                    entry.prev_in_column = NIL;
                }
                if target_head != NIL {
                    self.entries[target_head].prev_in_column = id;
                }
                self.columns[target] = id;
                self.column_size[target] += 1;
                dense.insert(row, id);
            }

            id = next;
        }

        self.erase_column(source);
    }

    /// Deep-copy this tableau into `other`. Both must span the same number
    /// of variables.
    pub fn backup_into(&self, other: &mut SparseTableau) {
        debug_assert_eq!(self.size, other.size);

        other.clear();
        for row in 0..self.size {
            let mut id = self.rows[row];
            while id != NIL {
                let entry = &self.entries[id];
                other.add_entry(entry.row, entry.column, entry.value);
                id = entry.next_in_row;
            }
        }
    }

    /// All cells as sorted `(row, column, value)` triples. Test support.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Var, Var, f64)> {
        let mut cells = Vec::with_capacity(self.total_size());
        for row in 0..self.size {
            for (column, value) in self.row_entries(row) {
                cells.push((row, column, value));
            }
        }
        cells.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        cells
    }
}
