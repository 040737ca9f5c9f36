use crate::timer::TimerEvent;
use std::fmt;

/// Notifications the clock publishes to its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Timer(TimerEvent),
    /// Some visual property changed.
    AppearanceChanged,
    /// The window position was written to the settings store.
    PositionPersisted { x: i32, y: i32 },
    VisibilityChanged(bool),
}

/// The line format used on the control channel.
impl fmt::Display for ClockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockEvent::Timer(TimerEvent::CountdownRunningChanged(running)) => {
                write!(f, "event countdown_running {running}")
            }
            ClockEvent::Timer(TimerEvent::StopwatchRunningChanged(running)) => {
                write!(f, "event stopwatch_running {running}")
            }
            ClockEvent::Timer(TimerEvent::RemainingChanged(seconds)) => {
                write!(f, "event remaining {seconds}")
            }
            ClockEvent::Timer(TimerEvent::ElapsedChanged(seconds)) => {
                write!(f, "event elapsed {seconds}")
            }
            ClockEvent::Timer(TimerEvent::Finished) => write!(f, "event finished"),
            ClockEvent::AppearanceChanged => write!(f, "event appearance"),
            ClockEvent::PositionPersisted { x, y } => write!(f, "event position {x} {y}"),
            ClockEvent::VisibilityChanged(visible) => write!(f, "event visible {visible}"),
        }
    }
}

type Subscriber<E> = Box<dyn FnMut(&E)>;

/// Single-threaded fan-out of events to subscribers, in subscription order.
pub struct EventBus<E> {
    subscribers: Vec<Subscriber<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&E) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn publish(&mut self, event: &E) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_every_subscriber_sees_events_in_order() {
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        {
            let first = first.clone();
            bus.subscribe(move |e: &ClockEvent| first.borrow_mut().push(*e));
        }
        {
            let second = second.clone();
            bus.subscribe(move |e: &ClockEvent| second.borrow_mut().push(*e));
        }

        bus.publish(&ClockEvent::AppearanceChanged);
        bus.publish(&ClockEvent::Timer(TimerEvent::Finished));

        let expected = vec![ClockEvent::AppearanceChanged, ClockEvent::Timer(TimerEvent::Finished)];
        assert_eq!(*first.borrow(), expected);
        assert_eq!(*second.borrow(), expected);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_event_lines() {
        assert_eq!(
            ClockEvent::Timer(TimerEvent::CountdownRunningChanged(true)).to_string(),
            "event countdown_running true"
        );
        assert_eq!(
            ClockEvent::Timer(TimerEvent::RemainingChanged(1499)).to_string(),
            "event remaining 1499"
        );
        assert_eq!(ClockEvent::Timer(TimerEvent::Finished).to_string(), "event finished");
        assert_eq!(
            ClockEvent::PositionPersisted { x: 120, y: 340 }.to_string(),
            "event position 120 340"
        );
    }
}
