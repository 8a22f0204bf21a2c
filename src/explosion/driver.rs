//! Frame-callback chains
//!
//! Each chain re-posts itself on the scheduler until its session method says
//! it is done. The shockwave and animation chains run side by side on the
//! same session; each borrow ends before the callback returns.

use std::cell::RefCell;
use std::rc::Rc;

use super::session::ExplosionSession;
use crate::platform::{ElementHost, FrameScheduler, VisualResource};

/// Session handle shared by frame chains and pointer handlers
pub type SharedSession<V> = Rc<RefCell<ExplosionSession<V>>>;

/// Drive the shockwave until its front reaches full radius
pub fn run_shockwave<V, S>(session: SharedSession<V>, scheduler: Rc<S>)
where
    V: VisualResource + 'static,
    S: FrameScheduler + ?Sized + 'static,
{
    let next = scheduler.clone();
    scheduler.post(Box::new(move |now| {
        let more = session.borrow_mut().shockwave_tick(now);
        if more {
            run_shockwave(session, next);
        }
    }));
}

/// Drive the animation loop until no pieces remain
pub fn run_frames<H, S>(session: SharedSession<H::Visual>, host: Rc<H>, scheduler: Rc<S>)
where
    H: ElementHost + 'static,
    H::Visual: 'static,
    S: FrameScheduler + ?Sized + 'static,
{
    let next = scheduler.clone();
    scheduler.post(Box::new(move |now| {
        let more = session.borrow_mut().frame(now, host.as_ref());
        if more {
            run_frames(session, host, next);
        } else {
            log::info!("explosion loop finished, every piece is home");
        }
    }));
}
