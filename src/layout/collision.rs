//! Vertical collision resolution between margin notes.

/// One note as the resolver sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackItem {
    /// Position in the document (source order); decides stacking order
    pub order: usize,
    /// Natural top of the note before any shift
    pub anchor_y: f32,
    pub height: f32,
}

/// Compute a downward shift per item so that no two notes overlap.
///
/// Items are stacked in document order rather than by measured `anchor_y`:
/// while a note is being edited its height changes from keystroke to
/// keystroke and can momentarily invert the measured order of two adjacent
/// anchors. The pass is greedy, so each note moves down only as far as the
/// note above it requires. Shifts are returned in input order.
pub fn resolve_collisions(items: &[StackItem], spacing: f32) -> Vec<f32> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by_key(|&i| items[i].order);

    let mut shifts = vec![0.0; items.len()];
    let mut next_free = f32::NEG_INFINITY;
    for i in order {
        let item = items[i];
        let target = item.anchor_y.max(next_free);
        shifts[i] = target - item.anchor_y;
        next_free = target + item.height.max(0.0) + spacing;
    }
    shifts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(order: usize, anchor_y: f32, height: f32) -> StackItem {
        StackItem {
            order,
            anchor_y,
            height,
        }
    }

    #[test]
    fn test_overlapping_pair_pushes_second_down() {
        let shifts = resolve_collisions(&[item(0, 100.0, 40.0), item(1, 110.0, 40.0)], 8.0);
        assert_eq!(shifts, vec![0.0, 38.0]);
    }

    #[test]
    fn test_separated_notes_stay_put() {
        let shifts = resolve_collisions(&[item(0, 0.0, 20.0), item(1, 100.0, 20.0)], 8.0);
        assert_eq!(shifts, vec![0.0, 0.0]);
    }

    #[test]
    fn test_shift_cascades_through_a_stack() {
        let items = [item(0, 0.0, 50.0), item(1, 10.0, 50.0), item(2, 20.0, 50.0)];
        let shifts = resolve_collisions(&items, 10.0);
        assert_eq!(shifts, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn test_document_order_wins_over_measured_position() {
        // Note 1 measures above note 0 (e.g. mid-edit), but stays below it
        let items = [item(1, 90.0, 30.0), item(0, 100.0, 30.0)];
        let shifts = resolve_collisions(&items, 5.0);
        assert_eq!(shifts[1], 0.0);
        assert_eq!(shifts[0], 45.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve_collisions(&[], 8.0).is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn shifted_notes_never_overlap(
                raw in prop::collection::vec((0.0f32..5000.0, 0.0f32..300.0), 0..40),
                spacing in 0.0f32..30.0,
            ) {
                let items: Vec<_> = raw
                    .iter()
                    .enumerate()
                    .map(|(order, (y, h))| item(order, *y, *h))
                    .collect();
                let shifts = resolve_collisions(&items, spacing);
                prop_assert_eq!(shifts.len(), items.len());
                for shift in &shifts {
                    prop_assert!(*shift >= 0.0);
                }
                for pair in items.windows(2).zip(shifts.windows(2)) {
                    let ([a, b], [sa, sb]) = pair else { unreachable!() };
                    let bottom = a.anchor_y + sa + a.height + spacing;
                    prop_assert!(bottom <= b.anchor_y + sb + 0.01);
                }
            }
        }
    }
}
