//! Loop behavior: timer cadence, tie-breaks, deferred structural
//! changes, stop and fault semantics. Driven by the simulated platform
//! so every run is deterministic; the last test exercises a real
//! cross-thread wakeup through the std backend.

use std::cell::RefCell;
use std::rc::Rc;

use tether::platform::{SimClock, SimPlatform, StdPlatform};
use tether::{Error, EventLoop, Fault, Payload, TimerMode};

fn sim_loop() -> (EventLoop<SimPlatform>, SimClock) {
    let (platform, clock) = SimPlatform::new();
    (EventLoop::new(platform), clock)
}

#[derive(Clone)]
struct Recorder<T: Clone>(Rc<RefCell<Vec<T>>>);

impl<T: Clone> Recorder<T> {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(Vec::new())))
    }

    fn push(&self, value: T) {
        self.0.borrow_mut().push(value);
    }

    fn take(&self) -> Vec<T> {
        self.0.borrow().clone()
    }
}

#[test]
fn periodic_toggle_scenario() {
    // 1000 ms periodic, boolean state starting at true, 3500 ms elapsed:
    // three fires, state threads true -> false -> true -> false
    let (mut ev, _clock) = sim_loop();
    let blink = ev.timer(TimerMode::Periodic, 1000).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 3500).unwrap();

    let seen = Recorder::new();
    let rec = seen.clone();
    let sub = ev
        .subscribe(blink, true, move |_ctx, payload, state: bool| {
            assert_eq!(payload, Payload::Tick);
            rec.push(state);
            Ok(!state)
        })
        .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(seen.take(), [true, false, true]);
    assert_eq!(ev.peek_state::<bool>(sub), Some(&false));
}

#[test]
fn periodic_has_no_drift_under_dispatch_latency() {
    // each dispatch step eats half a period; deadlines still advance on
    // the original grid and the timer fires floor(3500 / 1000) times
    let (mut ev, clock) = sim_loop();
    let timer = ev.timer(TimerMode::Periodic, 1000).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 3500).unwrap();

    let times = Recorder::new();
    let rec = times.clone();
    ev.subscribe(timer, (), move |ctx, _payload, state| {
        rec.push(ctx.now_ms());
        clock.advance(500);
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(times.take(), [1000, 2000, 3000]);
}

#[test]
fn missed_periods_coalesce_into_one_fire() {
    // a 2500 ms stall inside the first dispatch step swallows the 2000
    // and 3000 ticks; the catch-up fire happens once, then the grid resumes
    let (mut ev, clock) = sim_loop();
    let timer = ev.timer(TimerMode::Periodic, 1000).unwrap();

    let times = Recorder::new();
    let rec = times.clone();
    ev.subscribe(timer, 0u32, move |ctx, _payload, fires| {
        rec.push(ctx.now_ms());
        if fires == 0 {
            clock.advance(2500);
        }
        if fires == 2 {
            ctx.stop();
        }
        Ok(fires + 1)
    })
    .unwrap();

    ev.run().unwrap();
    // fire at 1000 stalls until 3500; the 2000 deadline catches up at
    // 3500; the next grid point after that is 4000
    assert_eq!(times.take(), [1000, 3500, 4000]);
}

#[test]
fn one_shot_fires_exactly_once() {
    let (mut ev, _clock) = sim_loop();
    let once = ev.timer(TimerMode::OneShot, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 1000).unwrap();

    let fires = Recorder::new();
    let rec = fires.clone();
    ev.subscribe(once, (), move |ctx, _payload, state| {
        rec.push(ctx.now_ms());
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(fires.take(), [100]);
}

#[test]
fn tie_break_timer_then_external_then_custom() {
    fn record_one_run() -> Vec<&'static str> {
        let (mut ev, clock) = sim_loop();
        let timer = ev.timer(TimerMode::Periodic, 100).unwrap();
        let (external, ext_notifier) = ev.external_contract().unwrap();
        let (custom, custom_notifier) = ev.custom_contract().unwrap();

        // custom raised first; the external entry still dispatches
        // ahead of it
        custom_notifier.raise(Payload::Value(9));
        ext_notifier.raise(Payload::Value(7));

        let order = Recorder::new();
        let rec = order.clone();
        ev.subscribe(timer, 0u32, move |ctx, _payload, fires| {
            rec.push("timer");
            if fires == 1 {
                ctx.stop();
            }
            Ok(fires + 1)
        })
        .unwrap();
        let rec = order.clone();
        ev.subscribe(external, (), move |_ctx, payload, state| {
            assert_eq!(payload, Payload::Value(7));
            rec.push("external");
            // push time past the timer deadline so the pending custom
            // event and the due timer are ready at the same wake
            clock.advance(150);
            Ok(state)
        })
        .unwrap();
        let rec = order.clone();
        ev.subscribe(custom, (), move |_ctx, payload, state| {
            assert_eq!(payload, Payload::Value(9));
            rec.push("custom");
            Ok(state)
        })
        .unwrap();

        ev.run().unwrap();
        order.take()
    }

    let first = record_one_run();
    assert_eq!(first, ["external", "timer", "custom", "timer"]);
    // identical inputs reproduce identical dispatch order
    assert_eq!(record_one_run(), first);
}

#[test]
fn simultaneous_timers_fire_in_creation_order() {
    let (mut ev, _clock) = sim_loop();
    let first = ev.timer(TimerMode::Periodic, 100).unwrap();
    let second = ev.timer(TimerMode::Periodic, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 150).unwrap();

    let order = Recorder::new();
    let rec = order.clone();
    // registered in reverse of creation; creation order must win
    ev.subscribe(second, (), move |_ctx, _payload, state| {
        rec.push("second");
        Ok(state)
    })
    .unwrap();
    let rec = order.clone();
    ev.subscribe(first, (), move |_ctx, _payload, state| {
        rec.push("first");
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(order.take(), ["first", "second"]);
}

#[test]
fn timer_subscriptions_fire_in_registration_order() {
    let (mut ev, _clock) = sim_loop();
    let timer = ev.timer(TimerMode::OneShot, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 200).unwrap();

    let order = Recorder::new();
    for label in ["a", "b", "c"] {
        let rec = order.clone();
        ev.subscribe(timer, (), move |_ctx, _payload, state| {
            rec.push(label);
            Ok(state)
        })
        .unwrap();
    }
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(order.take(), ["a", "b", "c"]);
}

#[test]
fn unsubscribe_from_own_handler_stops_future_fires() {
    let (mut ev, _clock) = sim_loop();
    let timer = ev.timer(TimerMode::Periodic, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 350).unwrap();

    let fires = Recorder::new();
    let rec = fires.clone();
    let sub = ev
        .subscribe(timer, (), move |ctx, _payload, state| {
            rec.push(ctx.now_ms());
            let own = ctx.handle();
            ctx.unsubscribe(own);
            Ok(state)
        })
        .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(fires.take(), [100]);
    assert!(!ev.is_active(sub));
}

#[test]
fn mid_step_unsubscribe_applies_after_the_step() {
    // a unsubscribes b while both are due for the same tick; the firing
    // set was fixed at step start, so b still runs this once
    let (mut ev, _clock) = sim_loop();
    let timer = ev.timer(TimerMode::OneShot, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 200).unwrap();

    let b_fires = Recorder::new();
    let rec = b_fires.clone();
    let b = ev
        .subscribe(timer, (), move |_ctx, _payload, state| {
            rec.push(());
            Ok(state)
        })
        .unwrap();
    // registered after b, runs after b; defer semantics are still
    // observable through is_active below
    ev.subscribe(timer, (), move |ctx, _payload, state| {
        ctx.unsubscribe(b);
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(b_fires.take().len(), 1);
    assert!(!ev.is_active(b));
}

#[test]
fn mid_handler_subscribe_first_fires_next_readiness() {
    let (mut ev, _clock) = sim_loop();
    let timer = ev.timer(TimerMode::Periodic, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 250).unwrap();

    let b_times = Recorder::new();
    let b_rec = b_times.clone();
    let added = Rc::new(RefCell::new(false));
    ev.subscribe(timer, (), move |ctx, _payload, state| {
        if !*added.borrow() {
            *added.borrow_mut() = true;
            let rec = b_rec.clone();
            ctx.subscribe(timer, (), move |ctx, _payload, state| {
                rec.push(ctx.now_ms());
                Ok(state)
            })
            .unwrap();
        }
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    // subscribed during the 100 ms step; first fire is the 200 ms tick
    assert_eq!(b_times.take(), [200]);
}

#[test]
fn stop_inside_handler_skips_rest_of_step_and_discards_queue() {
    let (mut ev, _clock) = sim_loop();
    let timer = ev.timer(TimerMode::OneShot, 100).unwrap();
    let (external, notifier) = ev.external_contract().unwrap();

    let later = Recorder::new();
    ev.subscribe(timer, (), move |ctx, _payload, state| {
        // leave an event in the queue, then stop: the event must be
        // discarded and the same-step subscription below never runs
        notifier.raise(Payload::Signal);
        ctx.stop();
        Ok(state)
    })
    .unwrap();
    let rec2 = later.clone();
    ev.subscribe(timer, (), move |_ctx, _payload, state| {
        rec2.push("same-step sub");
        Ok(state)
    })
    .unwrap();
    let rec3 = later.clone();
    ev.subscribe(external, (), move |_ctx, _payload, state| {
        rec3.push("external");
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    assert_eq!(later.take(), Vec::<&str>::new());

    // run again after the clean stop: the discarded event is gone for good
    let stopper = ev.timer(TimerMode::OneShot, 50).unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();
    ev.run().unwrap();
    assert_eq!(later.take(), Vec::<&str>::new());
}

#[test]
fn handler_fault_terminates_run_but_loop_stays_usable() {
    let (mut ev, _clock) = sim_loop();
    let bad = ev.timer(TimerMode::OneShot, 100).unwrap();
    let good = ev.timer(TimerMode::Periodic, 150).unwrap();

    let bad_sub = ev
        .subscribe(bad, (), |_ctx, _payload, _state: ()| {
            Err(Fault::new("boom"))
        })
        .unwrap();
    let times = Recorder::new();
    let rec = times.clone();
    ev.subscribe(good, 0u32, move |ctx, _payload, fires| {
        rec.push(ctx.now_ms());
        if fires == 2 {
            ctx.stop();
        }
        Ok(fires + 1)
    })
    .unwrap();

    match ev.run() {
        Err(Error::Handler(fault)) => assert_eq!(fault.message(), "boom"),
        other => panic!("expected handler fault, got {other:?}"),
    }
    assert!(times.take().is_empty());
    assert!(!ev.is_active(bad_sub));

    // scheduling state survived the fault: the periodic timer is still
    // on its original grid
    ev.run().unwrap();
    assert_eq!(times.take(), [150, 300, 450]);
}

#[test]
fn faulting_subscription_is_dropped_not_resumed() {
    // the handler would succeed on a second attempt, but a faulted
    // subscription is removed, not retried: the rerun completes without
    // it ever firing again
    let (mut ev, _clock) = sim_loop();
    let flaky = ev.timer(TimerMode::Periodic, 100).unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 250).unwrap();

    let fires = Recorder::new();
    let rec = fires.clone();
    let failed = Rc::new(RefCell::new(false));
    let sub = ev
        .subscribe(flaky, (), move |_ctx, _payload, state| {
            if !*failed.borrow() {
                *failed.borrow_mut() = true;
                return Err(Fault::new("transient"));
            }
            rec.push(());
            Ok(state)
        })
        .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    match ev.run() {
        Err(Error::Handler(fault)) => assert_eq!(fault.message(), "transient"),
        other => panic!("expected handler fault, got {other:?}"),
    }
    assert!(!ev.is_active(sub));
    assert_eq!(ev.peek_state::<()>(sub), None);

    ev.run().unwrap();
    assert!(fires.take().is_empty());
}

#[test]
fn fault_releases_single_consumer_claim() {
    let (mut ev, _clock) = sim_loop();
    let (external, notifier) = ev.external_contract().unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 50).unwrap();

    ev.subscribe(external, (), |_ctx, _payload, _state: ()| {
        Err(Fault::new("bad event"))
    })
    .unwrap();
    notifier.raise(Payload::Signal);
    assert!(matches!(ev.run(), Err(Error::Handler(_))));

    // the claim died with the subscription; the contract is free again
    ev.subscribe(external, (), |_ctx, _payload, state| Ok(state))
        .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();
    ev.run().unwrap();
}

#[test]
fn contract_table_exhaustion_is_reported() {
    let (mut ev, _clock) = sim_loop();
    for _ in 0..=u16::MAX as usize {
        ev.timer(TimerMode::OneShot, 1).unwrap();
    }
    assert_eq!(
        ev.timer(TimerMode::OneShot, 1),
        Err(Error::Exhausted("contract table full"))
    );
}

#[test]
fn single_consumer_contracts_reject_second_subscriber() {
    let (mut ev, _clock) = sim_loop();
    let (external, _notifier) = ev.external_contract().unwrap();

    let first = ev
        .subscribe(external, (), |_ctx, _payload, state| Ok(state))
        .unwrap();
    let second = ev.subscribe(external, (), |_ctx, _payload, state: ()| Ok(state));
    assert_eq!(second.unwrap_err(), Error::AlreadySubscribed);

    // releasing the claim makes the contract subscribable again
    ev.unsubscribe(first);
    ev.unsubscribe(first); // no-op on a dead handle
    assert!(
        ev.subscribe(external, (), |_ctx, _payload, state| Ok(state))
            .is_ok()
    );
}

#[test]
fn zero_period_is_rejected() {
    let (mut ev, _clock) = sim_loop();
    assert!(matches!(
        ev.timer(TimerMode::Periodic, 0),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        ev.timer(TimerMode::OneShot, 0),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn foreign_contract_is_rejected() {
    let (mut ev_a, _clock_a) = sim_loop();
    let (mut ev_b, _clock_b) = sim_loop();
    let foreign = ev_b.timer(TimerMode::Periodic, 100).unwrap();

    assert!(matches!(
        ev_a.subscribe(foreign, (), |_ctx, _payload, state: ()| Ok(state)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn overflow_delivers_capacity_and_drops_the_rest() {
    let (mut ev, _clock) = sim_loop();
    let (external, notifier) = ev.external_contract().unwrap();
    let stopper = ev.timer(TimerMode::OneShot, 1).unwrap();

    for n in 0..20u32 {
        notifier.raise(Payload::Value(n));
    }

    let delivered = Recorder::new();
    let rec = delivered.clone();
    ev.subscribe(external, (), move |_ctx, payload, state| {
        if let Payload::Value(n) = payload {
            rec.push(n);
        }
        Ok(state)
    })
    .unwrap();
    ev.subscribe(stopper, (), |ctx, _payload, state| {
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    ev.run().unwrap();
    // 16-slot hand-off: first 16 arrive in order, the rest were dropped
    assert_eq!(delivered.take(), (0..16).collect::<Vec<_>>());
}

#[test]
fn notifier_raised_from_another_thread_wakes_a_parked_loop() {
    let mut ev = EventLoop::new(StdPlatform::new());
    let (external, notifier) = ev.external_contract().unwrap();

    let fired = Recorder::new();
    let rec = fired.clone();
    ev.subscribe(external, (), move |ctx, payload, state| {
        assert_eq!(payload, Payload::Signal);
        rec.push(());
        ctx.stop();
        Ok(state)
    })
    .unwrap();

    let producer = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        notifier.raise(Payload::Signal);
    });

    // no timers armed: the loop parks indefinitely until the producer
    // wakes it
    ev.run().unwrap();
    producer.join().unwrap();
    assert_eq!(fired.take().len(), 1);
}
