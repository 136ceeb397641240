//! Property tests: replicas converge regardless of delivery interleaving, and
//! the reported text updates always describe exactly what changed.

use proptest::prelude::*;
use std::collections::BTreeMap;
use textsync_core::crdt::{apply_changes, Change, Document, Marker, Operation, Point, Range};

const SITES: usize = 3;

#[derive(Debug, Clone)]
enum Step {
    Edit {
        site: usize,
        start: usize,
        len: usize,
        text: String,
    },
    Undo {
        site: usize,
    },
    Redo {
        site: usize,
    },
    Mark {
        site: usize,
        start: usize,
        len: usize,
        exclusive: bool,
    },
    Deliver {
        from: usize,
        to: usize,
        count: usize,
    },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        5 => (0..SITES, any::<usize>(), 0..4usize, "[ab\n]{0,3}")
            .prop_map(|(site, start, len, text)| Step::Edit { site, start, len, text }),
        1 => (0..SITES).prop_map(|site| Step::Undo { site }),
        1 => (0..SITES).prop_map(|site| Step::Redo { site }),
        3 => (0..SITES, 0..SITES, 1..6usize)
            .prop_map(|(from, to, count)| Step::Deliver { from, to, count }),
    ]
}

fn marker_step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => step_strategy(),
        1 => (0..SITES, any::<usize>(), 0..4usize, any::<bool>())
            .prop_map(|(site, start, len, exclusive)| Step::Mark { site, start, len, exclusive }),
    ]
}

fn point_at(text: &str, char_index: usize) -> Point {
    let mut point = Point::ZERO;
    for ch in text.chars().take(char_index) {
        if ch == '\n' {
            point = Point::new(point.row + 1, 0);
        } else {
            point.column += 1;
        }
    }
    point
}

/// A document plus a plain-string copy kept up to date only through the
/// changes the document reports
struct Replica {
    doc: Document,
    mirror: String,
    outbox: Vec<Operation>,
}

impl Replica {
    fn new(site_id: u32) -> Self {
        Self {
            doc: Document::new(site_id).unwrap(),
            mirror: String::new(),
            outbox: Vec::new(),
        }
    }

    /// Replace `len` chars at char index `start` (both clamped)
    fn edit(&mut self, start: usize, len: usize, text: &str) {
        let current = self.doc.get_text();
        let char_count = current.chars().count();
        let start = start % (char_count + 1);
        let end = (start + len).min(char_count);
        if start == end && text.is_empty() {
            return;
        }

        let operations = self
            .doc
            .set_text_in_range(point_at(&current, start), point_at(&current, end), text)
            .unwrap();
        self.outbox.extend(operations);

        let byte = |index: usize| {
            self.mirror
                .char_indices()
                .nth(index)
                .map_or(self.mirror.len(), |(byte, _)| byte)
        };
        let (start_byte, end_byte) = (byte(start), byte(end));
        self.mirror.replace_range(start_byte..end_byte, text);
    }

    /// Move this site's single cursor to cover `len` chars at `start`
    fn mark(&mut self, start: usize, len: usize, exclusive: bool) {
        let current = self.doc.get_text();
        let char_count = current.chars().count();
        let start = start % (char_count + 1);
        let end = (start + len).min(char_count);

        let marker = Marker {
            range: Range::new(point_at(&current, start), point_at(&current, end)),
            exclusive,
            reversed: false,
            tailed: start != end,
        };
        let operations = self
            .doc
            .update_markers(BTreeMap::from([(1, Some(BTreeMap::from([(1, Some(marker))])))]))
            .unwrap();
        self.outbox.extend(operations);
    }

    fn undo_or_redo(&mut self, redo: bool) {
        let result = if redo {
            self.doc.redo()
        } else {
            self.doc.undo()
        };
        if let Some(result) = result {
            self.apply(&result.text_updates);
            self.outbox.extend(result.operations);
        }
    }

    fn integrate(&mut self, operations: Vec<Operation>) {
        let result = self.doc.integrate_operations(operations).unwrap();
        self.apply(&result.text_updates);
    }

    fn apply(&mut self, changes: &[Change]) {
        self.mirror = apply_changes(&self.mirror, changes);
    }
}

/// Deliver `from`'s unsent operations to `to`, at most `count` of them
fn deliver(
    replicas: &mut [Replica],
    cursors: &mut [[usize; SITES]; SITES],
    from: usize,
    to: usize,
    count: usize,
) {
    let cursor = cursors[from][to];
    let end = cursor.saturating_add(count).min(replicas[from].outbox.len());
    let operations = replicas[from].outbox[cursor..end].to_vec();
    cursors[from][to] = end;
    replicas[to].integrate(operations);
}

fn run(steps: Vec<Step>) -> Vec<Replica> {
    let mut replicas: Vec<Replica> = (1..=SITES as u32).map(Replica::new).collect();
    let mut cursors = [[0usize; SITES]; SITES];

    for step in steps {
        match step {
            Step::Edit { site, start, len, text } => replicas[site].edit(start, len, &text),
            Step::Undo { site } => replicas[site].undo_or_redo(false),
            Step::Redo { site } => replicas[site].undo_or_redo(true),
            Step::Mark { site, start, len, exclusive } => replicas[site].mark(start, len, exclusive),
            Step::Deliver { from, to, count } => {
                if from != to {
                    deliver(&mut replicas, &mut cursors, from, to, count);
                }
            }
        }
    }

    for from in 0..SITES {
        for to in 0..SITES {
            if from != to {
                deliver(&mut replicas, &mut cursors, from, to, usize::MAX);
            }
        }
    }
    replicas
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn replicas_converge(steps in prop::collection::vec(step_strategy(), 1..60)) {
        let replicas = run(steps);

        let expected = replicas[0].doc.get_text();
        for replica in &replicas {
            prop_assert_eq!(replica.doc.get_text(), expected.clone());
            prop_assert_eq!(&replica.mirror, &expected);
            prop_assert_eq!(replica.doc.deferred_count(), 0);
        }
    }

    #[test]
    fn marker_layers_converge(steps in prop::collection::vec(marker_step_strategy(), 1..120)) {
        let replicas = run(steps);

        let expected = replicas[0].doc.get_text();
        for replica in &replicas {
            prop_assert_eq!(replica.doc.get_text(), expected.clone());
            prop_assert_eq!(replica.doc.deferred_count(), 0);
        }

        for owner in &replicas {
            let site_id = owner.doc.site_id();
            let owned = owner.doc.get_markers().get(&site_id).cloned().unwrap_or_default();
            for replica in &replicas {
                let seen = replica.doc.get_markers().get(&site_id).cloned().unwrap_or_default();
                prop_assert_eq!(&seen, &owned);
            }
        }

        let late = replicas[0].doc.replicate(99).unwrap();
        prop_assert_eq!(late.get_text(), expected);
        prop_assert_eq!(late.get_markers(), replicas[0].doc.get_markers());
    }

    #[test]
    fn shuffled_delivery_converges(
        edits in prop::collection::vec((any::<usize>(), 0..4usize, "[xyz\n]{0,4}", 0..4u8), 1..40),
        keys in prop::collection::vec(any::<u64>(), 80),
        chunks in 1..5usize,
    ) {
        let mut source = Replica::new(1);
        for (start, len, text, action) in edits {
            match action {
                0 => source.undo_or_redo(false),
                1 => source.undo_or_redo(true),
                _ => source.edit(start, len, &text),
            }
        }

        // Any order at all, split over several calls.
        let mut operations: Vec<(u64, Operation)> = source
            .outbox
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, operation)| (keys[i % keys.len()].wrapping_add(i as u64), operation))
            .collect();
        operations.sort_by_key(|(key, _)| *key);
        let operations: Vec<Operation> = operations.into_iter().map(|(_, op)| op).collect();

        let mut target = Replica::new(2);
        let chunk_size = operations.len() / chunks + 1;
        for chunk in operations.chunks(chunk_size) {
            target.integrate(chunk.to_vec());
        }

        prop_assert_eq!(target.doc.deferred_count(), 0);
        prop_assert_eq!(target.doc.get_text(), source.doc.get_text());
        prop_assert_eq!(&target.mirror, &source.mirror);
    }
}

#[test]
fn three_sites_with_interleaved_undo() {
    let mut replicas: Vec<Replica> = (1..=3).map(Replica::new).collect();
    let mut cursors = [[0usize; SITES]; SITES];

    replicas[0].edit(0, 0, "hello world");
    deliver(&mut replicas, &mut cursors, 0, 1, usize::MAX);
    deliver(&mut replicas, &mut cursors, 0, 2, usize::MAX);

    replicas[1].edit(5, 0, ",");
    replicas[2].edit(6, 5, "there");
    replicas[0].undo_or_redo(false);

    for from in 0..SITES {
        for to in 0..SITES {
            if from != to {
                deliver(&mut replicas, &mut cursors, from, to, usize::MAX);
            }
        }
    }

    let text = replicas[0].doc.get_text();
    assert_eq!(text, ",there");
    for replica in &replicas {
        assert_eq!(replica.doc.get_text(), text);
        assert_eq!(replica.mirror, text);
    }
}
