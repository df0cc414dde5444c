//! Asset source and instance types shared by the unit tests of this crate.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use foldhash::HashMap;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::time::sleep;

use crate::{AssetSource, ContainerHost, Placeable, Poolable, TemplateLoadError};

#[derive(Debug, Default)]
pub(crate) struct Widget {
    pub(crate) template: &'static str,
    pub(crate) serial: u64,
    pub(crate) acquired: u32,
    pub(crate) released: u32,
    pub(crate) placement_resets: u32,
    pub(crate) placement_active: bool,
}

impl Poolable for Widget {
    fn on_acquired(&mut self) {
        self.acquired += 1;
    }

    fn on_released(&mut self) {
        self.released += 1;
    }
}

impl Placeable for Widget {
    fn reset_placement(&mut self) {
        self.placement_resets += 1;
    }

    fn set_placement_active(&mut self, active: bool) {
        self.placement_active = active;
    }
}

/// Loads every template whose key is not marked as failing. Failures can be limited to the
/// first N attempts to exercise retries.
#[derive(Debug, Default)]
pub(crate) struct TestAssets {
    pub(crate) load_calls: Cell<usize>,
    pub(crate) failures_remaining: RefCell<HashMap<&'static str, usize>>,
    pub(crate) load_delay: Cell<Option<Duration>>,
    pub(crate) created: Cell<u64>,
    pub(crate) destroyed: Cell<usize>,
    pub(crate) unloaded: RefCell<Vec<&'static str>>,
}

impl TestAssets {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn fail_always(&self, key: &'static str) {
        self.failures_remaining.borrow_mut().insert(key, usize::MAX);
    }

    pub(crate) fn fail_times(&self, key: &'static str, times: usize) {
        self.failures_remaining.borrow_mut().insert(key, times);
    }
}

impl AssetSource for TestAssets {
    type Key = &'static str;
    type Template = &'static str;
    type Instance = Widget;

    fn load(
        &self,
        key: &&'static str,
    ) -> LocalBoxFuture<'static, Result<&'static str, TemplateLoadError>> {
        self.load_calls.set(self.load_calls.get() + 1);

        let key = *key;
        let result = match self.failures_remaining.borrow_mut().get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(1);
                Err(TemplateLoadError::unavailable(&key, "test asset marked as failing"))
            }
            _ => Ok(key),
        };

        let delay = self.load_delay.get();

        async move {
            if let Some(delay) = delay {
                sleep(delay).await;
            }

            result
        }
        .boxed_local()
    }

    fn instantiate(&self, _key: &&'static str, template: &&'static str) -> Widget {
        let serial = self.created.get();
        self.created.set(serial + 1);

        Widget {
            template: *template,
            serial,
            ..Widget::default()
        }
    }

    fn destroy(&self, instance: Widget) {
        self.destroyed.set(self.destroyed.get() + 1);
        drop(instance);
    }

    fn unload(&self, key: &&'static str, _template: &&'static str) {
        self.unloaded.borrow_mut().push(key);
    }
}

/// Records every attach and detach as a line of text.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    log: Rc<RefCell<Vec<String>>>,
}

impl RecordingHost {
    pub(crate) fn log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }
}

impl ContainerHost<Widget> for RecordingHost {
    type Container = &'static str;

    fn attach(&mut self, instance: &mut Widget, container: &&'static str) {
        self.log
            .borrow_mut()
            .push(format!("attach {} to {container}", instance.serial));
    }

    fn detach(&mut self, instance: &mut Widget, container: &&'static str) {
        let state = if instance.placement_active {
            "active"
        } else {
            "inactive"
        };

        self.log
            .borrow_mut()
            .push(format!("detach {state} {} to {container}", instance.serial));
    }
}
