//! Outgoing event batching.
//!
//! Captured events are queued and flushed to the wire every few
//! milliseconds. Consecutive motion events toward the same peer coalesce
//! within the batch window; button and key transitions never wait.

use mouseshare_types::{InputEvent, TimedEvent};

/// Queue of events awaiting the next flush.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<TimedEvent>,
}

impl EventBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, coalescing with the previous one where the pair is
    /// two mouse moves, two drags of the same button, or two scrolls.
    pub fn push(&mut self, timed: TimedEvent) {
        if let Some(last) = self.events.last_mut() {
            match (&mut last.event, &timed.event) {
                (
                    InputEvent::MouseMove { dx, dy, modifiers },
                    InputEvent::MouseMove {
                        dx: ndx,
                        dy: ndy,
                        modifiers: nmods,
                    },
                ) if modifiers == nmods => {
                    *dx += ndx;
                    *dy += ndy;
                    last.timestamp_us = timed.timestamp_us;
                    return;
                }
                (
                    InputEvent::MouseDrag {
                        dx,
                        dy,
                        button,
                        modifiers,
                    },
                    InputEvent::MouseDrag {
                        dx: ndx,
                        dy: ndy,
                        button: nbutton,
                        modifiers: nmods,
                    },
                ) if button == nbutton && modifiers == nmods => {
                    *dx += ndx;
                    *dy += ndy;
                    last.timestamp_us = timed.timestamp_us;
                    return;
                }
                (
                    InputEvent::Scroll { dx, dy },
                    InputEvent::Scroll { dx: ndx, dy: ndy },
                ) => {
                    *dx += ndx;
                    *dy += ndy;
                    last.timestamp_us = timed.timestamp_us;
                    return;
                }
                _ => {}
            }
        }
        self.events.push(timed);
    }

    /// Drain the queue in capture order.
    #[must_use]
    pub fn take(&mut self) -> Vec<TimedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mouseshare_types::{Modifiers, MouseButton};

    fn mouse_move(dx: i32, dy: i32) -> TimedEvent {
        TimedEvent::now(InputEvent::MouseMove {
            dx,
            dy,
            modifiers: Modifiers::default(),
        })
    }

    #[test]
    fn consecutive_moves_coalesce() {
        let mut batch = EventBatch::new();
        batch.push(mouse_move(3, 1));
        batch.push(mouse_move(2, -4));
        batch.push(mouse_move(1, 1));

        let events = batch.take();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event,
            InputEvent::MouseMove {
                dx: 6,
                dy: -2,
                modifiers: Modifiers::default()
            }
        );
    }

    #[test]
    fn modifier_change_breaks_coalescing() {
        let mut batch = EventBatch::new();
        batch.push(mouse_move(3, 0));
        batch.push(TimedEvent::now(InputEvent::MouseMove {
            dx: 2,
            dy: 0,
            modifiers: Modifiers(Modifiers::SHIFT),
        }));
        assert_eq!(batch.take().len(), 2);
    }

    #[test]
    fn scrolls_coalesce() {
        let mut batch = EventBatch::new();
        batch.push(TimedEvent::now(InputEvent::Scroll { dx: 0.0, dy: 2.5 }));
        batch.push(TimedEvent::now(InputEvent::Scroll { dx: 1.0, dy: 2.5 }));

        let events = batch.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, InputEvent::Scroll { dx: 1.0, dy: 5.0 });
    }

    #[test]
    fn button_events_preserve_order_and_count() {
        let mut batch = EventBatch::new();
        batch.push(mouse_move(1, 0));
        batch.push(TimedEvent::now(InputEvent::MouseDown {
            button: MouseButton::Left,
            click_count: 1,
            modifiers: Modifiers::default(),
        }));
        batch.push(mouse_move(1, 0));

        let events = batch.take();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1].event, InputEvent::MouseDown { .. }));
    }

    #[test]
    fn take_empties_the_queue() {
        let mut batch = EventBatch::new();
        batch.push(mouse_move(1, 1));
        let _ = batch.take();
        assert!(batch.is_empty());
    }
}
