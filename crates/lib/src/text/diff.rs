//! Character-level Myers diff.

use super::TextOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal,
    Delete,
    Insert,
}

/// Compute the operations turning `old` into `new`.
///
/// Lengths are counted in Unicode scalar values. The common prefix and suffix
/// are trimmed before running Myers' O(ND) algorithm on the remainder, so the
/// number of inserted plus deleted characters is minimal.
pub fn diff(old: &str, new: &str) -> Vec<TextOp> {
    if old == new {
        return Vec::new();
    }
    if old.is_empty() {
        return vec![TextOp::Insert(new.to_string())];
    }

    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut builder = OpBuilder::default();
    builder.retain(prefix);
    let mut b_pos = 0;
    for edit in myers(a_mid, b_mid) {
        match edit {
            Edit::Equal => {
                builder.retain(1);
                b_pos += 1;
            }
            Edit::Delete => builder.delete(1),
            Edit::Insert => {
                builder.insert(b_mid[b_pos]);
                b_pos += 1;
            }
        }
    }
    builder.retain(suffix);
    builder.finish()
}

/// Shortest edit script between `a` and `b`, in forward order.
fn myers(a: &[char], b: &[char]) -> Vec<Edit> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max;
    let mut v = vec![0isize; (2 * max + 1) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (offset + k) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    // Walk the recorded frontiers backwards from (n, m).
    let mut edits = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);
    for d in (0..trace.len() as isize).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[(offset + k - 1) as usize] < v[(offset + k + 1) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(offset + prev_k) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                edits.push(Edit::Insert);
            } else {
                edits.push(Edit::Delete);
            }
        }
        x = prev_x;
        y = prev_y;
    }
    edits.reverse();
    edits
}

/// Accumulates single-character edits into coalesced operations.
#[derive(Default)]
struct OpBuilder {
    ops: Vec<TextOp>,
}

impl OpBuilder {
    fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.ops.last_mut() {
            Some(TextOp::Retain(count)) => *count += n,
            _ => self.ops.push(TextOp::Retain(n)),
        }
    }

    fn delete(&mut self, n: usize) {
        match self.ops.last_mut() {
            Some(TextOp::Delete(count)) => *count += n,
            _ => self.ops.push(TextOp::Delete(n)),
        }
    }

    fn insert(&mut self, c: char) {
        match self.ops.last_mut() {
            Some(TextOp::Insert(text)) => text.push(c),
            _ => self.ops.push(TextOp::Insert(c.to_string())),
        }
    }

    fn finish(self) -> Vec<TextOp> {
        self.ops
    }
}
