//! Persistent treap of pieces keyed by implicit document position.
//!
//! Nodes are immutable and shared through `Arc`; every update copies only the
//! path from the root to the touched nodes, so cloning a root is an O(1)
//! snapshot. Each node caches the char length, line-break sum and piece
//! count of its subtree, which gives O(log n) offset lookup.

use std::sync::Arc;

use super::piece::Piece;
use crate::buffer::BufferStore;

pub(crate) type Link = Option<Arc<Node>>;

#[derive(Debug)]
pub(crate) struct Node {
    pub piece: Piece,
    priority: u32,
    pub left: Link,
    pub right: Link,
    len: usize,
    breaks: usize,
    count: usize,
}

pub(crate) fn len(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.len)
}

pub(crate) fn breaks(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.breaks)
}

pub(crate) fn count(link: &Link) -> usize {
    link.as_ref().map_or(0, |n| n.count)
}

fn node(piece: Piece, priority: u32, left: Link, right: Link) -> Link {
    Some(Arc::new(Node {
        len: len(&left) + piece.len + len(&right),
        breaks: breaks(&left) + piece.line_breaks + breaks(&right),
        count: count(&left) + 1 + count(&right),
        piece,
        priority,
        left,
        right,
    }))
}

pub(crate) fn leaf(piece: Piece, priority: u32) -> Link {
    node(piece, priority, None, None)
}

/// Concatenate two trees; every piece of `a` precedes every piece of `b`.
pub(crate) fn merge(a: Link, b: Link) -> Link {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => {
            if a.priority >= b.priority {
                let right = merge(a.right.clone(), Some(b));
                node(a.piece, a.priority, a.left.clone(), right)
            } else {
                let left = merge(Some(a), b.left.clone());
                node(b.piece, b.priority, left, b.right.clone())
            }
        }
    }
}

/// Split into a tree holding exactly the first `at` chars and one holding the
/// rest. A piece straddling `at` is cut in two; both halves keep its priority,
/// which preserves the heap order on either side.
pub(crate) fn split(link: &Link, at: usize, store: &BufferStore) -> (Link, Link) {
    let Some(n) = link else {
        return (None, None);
    };
    let left_len = len(&n.left);
    let piece_end = left_len + n.piece.len;

    if at <= left_len {
        let (l, r) = split(&n.left, at, store);
        (l, node(n.piece, n.priority, r, n.right.clone()))
    } else if at >= piece_end {
        let (l, r) = split(&n.right, at - piece_end, store);
        (node(n.piece, n.priority, n.left.clone(), l), r)
    } else {
        let (head, tail) = n.piece.split(store, at - left_len);
        (
            node(head, n.priority, n.left.clone(), None),
            node(tail, n.priority, None, n.right.clone()),
        )
    }
}

pub(crate) fn last(link: &Link) -> Option<Piece> {
    let mut cur = link.as_ref()?;
    while let Some(right) = &cur.right {
        cur = right;
    }
    Some(cur.piece)
}

/// Replace the last piece, copying only the right spine.
pub(crate) fn replace_last(link: &Link, piece: Piece) -> Link {
    let n = link.as_ref()?;
    match &n.right {
        Some(_) => node(n.piece, n.priority, n.left.clone(), replace_last(&n.right, piece)),
        None => node(piece, n.priority, n.left.clone(), None),
    }
}

/// Piece containing `offset` and the offset local to it. An offset on a
/// boundary resolves to the piece that starts there.
pub(crate) fn locate(link: &Link, mut offset: usize) -> Option<(Piece, usize)> {
    let mut cur = link.as_ref()?;
    loop {
        let left_len = len(&cur.left);
        if offset < left_len {
            cur = cur.left.as_ref()?;
        } else if offset < left_len + cur.piece.len {
            return Some((cur.piece, offset - left_len));
        } else {
            offset -= left_len + cur.piece.len;
            cur = cur.right.as_ref()?;
        }
    }
}

/// In-order piece iterator starting at a document offset.
pub(crate) struct Pieces<'a> {
    stack: Vec<&'a Node>,
    /// Chars to skip in the first yielded piece
    skip: usize,
}

impl<'a> Pieces<'a> {
    pub fn new(link: &'a Link, mut offset: usize) -> Self {
        let mut stack = Vec::new();
        let mut skip = 0;
        let mut cur = link.as_deref();
        while let Some(n) = cur {
            let left_len = len(&n.left);
            if offset < left_len {
                stack.push(n);
                cur = n.left.as_deref();
            } else if offset < left_len + n.piece.len {
                stack.push(n);
                skip = offset - left_len;
                break;
            } else {
                offset -= left_len + n.piece.len;
                cur = n.right.as_deref();
            }
        }
        Self { stack, skip }
    }

    fn push_left_spine(&mut self, mut cur: Option<&'a Node>) {
        while let Some(n) = cur {
            self.stack.push(n);
            cur = n.left.as_deref();
        }
    }
}

impl<'a> Iterator for Pieces<'a> {
    /// The piece and the local offset reading starts at
    type Item = (&'a Piece, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        self.push_left_spine(n.right.as_deref());
        let skip = std::mem::take(&mut self.skip);
        Some((&n.piece, skip))
    }
}

/// Walk every node, checking cached aggregates and heap order.
pub(crate) fn validate(link: &Link) -> (usize, usize, usize) {
    let Some(n) = link else {
        return (0, 0, 0);
    };
    for child in [&n.left, &n.right].into_iter().flatten() {
        assert!(child.priority <= n.priority, "treap heap order violated");
    }
    assert!(n.piece.len > 0, "empty piece in table");
    let (ll, lb, lc) = validate(&n.left);
    let (rl, rb, rc) = validate(&n.right);
    let totals = (ll + n.piece.len + rl, lb + n.piece.line_breaks + rb, lc + 1 + rc);
    assert_eq!(totals, (n.len, n.breaks, n.count), "stale subtree aggregate");
    totals
}
