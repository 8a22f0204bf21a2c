//! DOM Explode entry point
//!
//! On the web this installs logging and hooks the trigger button. Natively it
//! blows up a small in-memory page, lets it settle, drags every piece home and
//! prints what happened.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"logger already installed".into());
    }
    log::info!("DOM Explode ready");
    dom_explode::platform::web::install_trigger_button("dnp-button");
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("DOM Explode (native) starting...");
    log::info!("Running a headless explosion - serve the wasm build for the real thing");

    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(7);

    match headless::run(seed) {
        Ok(summary) => {
            println!("{}", summary);
        }
        Err(e) => {
            log::error!("headless run failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::cell::Cell;
    use std::rc::Rc;

    use dom_explode::platform::{FrameScheduler, ManualScheduler, MemoryHost, PointerSample};
    use dom_explode::sim::{NodeState, ReleaseOutcome};
    use dom_explode::{Explosion, ExplosionSettings, Rect, Result};

    /// 60 Hz
    const FRAME_MS: f64 = 16.0;

    /// A page that looks roughly like a blog post
    fn build_page() -> Rc<MemoryHost> {
        let host = Rc::new(MemoryHost::new(Rect::new(0.0, 0.0, 1280.0, 720.0)));
        let root = host.root_id();

        let header = host.add(root, "header", Rect::new(0.0, 0.0, 1280.0, 96.0));
        host.add(header, "h1", Rect::new(40.0, 24.0, 420.0, 48.0));
        host.add(header, "nav", Rect::new(880.0, 32.0, 360.0, 32.0));

        let main = host.add_transparent(root, "main", Rect::new(0.0, 120.0, 1280.0, 560.0));
        let article = host.add_transparent(main, "article", Rect::new(160.0, 120.0, 960.0, 560.0));
        for row in 0..6 {
            let y = 140.0 + row as f32 * 80.0;
            let para = host.add(article, "p", Rect::new(180.0, y, 920.0, 56.0));
            for word in 0..5 {
                host.add(para, "span", Rect::new(190.0 + word as f32 * 150.0, y + 12.0, 120.0, 28.0));
            }
        }
        host.add(root, "footer", Rect::new(0.0, 680.0, 1280.0, 40.0));
        host
    }

    pub fn run(seed: u64) -> Result<String> {
        let host = build_page();
        let scheduler = Rc::new(ManualScheduler::new(0.0));
        let explosion = Explosion::new(host.clone(), ExplosionSettings::seeded(seed))?;

        let report = explosion.trigger(&scheduler);
        log::info!("trigger report: {}", serde_json::to_string(&report)?);

        let Some(session) = explosion.session() else {
            return Ok("nothing exploded".to_string());
        };
        let repaired_seen = Rc::new(Cell::new(0usize));
        {
            let seen = repaired_seen.clone();
            session
                .borrow_mut()
                .set_repair_listener(move |_, _| seen.set(seen.get() + 1));
        }

        // Let the pieces fly for ten seconds
        for _ in 0..625 {
            scheduler.advance(FRAME_MS);
        }
        let settled = session.borrow().bodies().filter(|b| b.settled).count();
        log::info!("{} of {} pieces at rest", settled, session.borrow().len());
        log::info!("shockwave struck {} pieces", session.borrow().shockwave().applied_count());

        // Drag pieces home until nothing more can be repaired
        let mut t = scheduler.now();
        loop {
            let next = session
                .borrow()
                .bodies()
                .find(|b| b.repair_allowed() && !b.removed)
                .and_then(|b| b.anchor.map(|a| (b.id, b.pos, a.original_center())));
            let Some((id, from, home)) = next else {
                break;
            };

            let mut s = session.borrow_mut();
            s.pointer_down(id, PointerSample::new(from.x, from.y, t));
            s.pointer_move(PointerSample::new(home.x, home.y, t + 120.0));
            let outcome = s.pointer_up(PointerSample::new(home.x, home.y, t + 180.0), host.as_ref());
            if outcome != ReleaseOutcome::Repair {
                log::warn!("body {} did not snap home ({:?})", id, outcome);
                break;
            }
            t += 200.0;
        }
        let frames = scheduler.run_until_idle(FRAME_MS, 10_000);
        let restored = session.borrow().graph().count(NodeState::Repaired);

        Ok(format!(
            "{} bodies, {} wrappers skipped, {} settled after 10s, {} repaired ({} elements restored), loop ended after {} more frames ({})",
            report.created,
            report.skipped,
            settled,
            repaired_seen.get(),
            restored,
            frames,
            if explosion.is_active() { "still running" } else { "page restored" },
        ))
    }
}
