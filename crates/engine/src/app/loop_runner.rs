use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use crate::session::Session;

use super::clock::{normalize_non_zero_duration, FixedStepClock, StepPlan};
use super::input::{InputCollector, InputSnapshot};
use super::metrics::{LoopMetricsSnapshot, MetricsAccumulator};
use super::rendering::Renderer;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Window pixels per level pixel once a level is shown.
    pub window_scale: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Dungeon".to_string(),
            window_width: 640,
            window_height: 480,
            window_scale: 3,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, mut session: Session) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let window_for_loop = Arc::clone(&window);
    let mut renderer = Renderer::new(window).map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let mut clock = FixedStepClock::new(
        config.target_tps,
        config.max_frame_delta,
        config.max_ticks_per_frame,
    );
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let window_scale = config.window_scale.max(1);
    log_loop_config(&clock, metrics_log_interval, "windowed");

    let mut input_collector = InputCollector::new();
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_applied_title: Option<String> = None;
    let mut last_level_size: Option<(u32, u32)> = None;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        input_collector.mark_quit_requested();
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        input_collector.handle_keyboard_input(&event);
                        if input_collector.quit_requested {
                            info!(reason = "escape_key", "shutdown_requested");
                            window_target.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        let plan = clock.advance(raw_frame_dt);
                        run_planned_ticks(
                            &plan,
                            clock.fixed_dt(),
                            &mut session,
                            &mut metrics_accumulator,
                            || input_collector.snapshot_for_tick(),
                        );
                        report_clamp(&plan, clock.max_ticks_per_frame(), &mut metrics_accumulator);

                        let level_size = session.pixel_size();
                        if level_size != last_level_size {
                            if let Some((width, height)) = level_size {
                                let _ = window_for_loop.request_inner_size(scaled_window_size(
                                    width,
                                    height,
                                    window_scale,
                                ));
                            }
                            last_level_size = level_size;
                        }

                        if let Err(error) = renderer.render_session(&session) {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                        }

                        let next_title = session.title();
                        if last_applied_title.as_deref() != Some(next_title.as_str()) {
                            window_for_loop.set_title(&next_title);
                            last_applied_title = Some(next_title);
                        }

                        metrics_accumulator.record_frame(raw_frame_dt);
                        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                            log_metrics(&snapshot);
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window_for_loop.request_redraw();
            }
            Event::LoopExiting => {
                session.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Runs the same fixed-step loop without a window until `shutdown` is set.
pub fn run_headless(config: LoopConfig, mut session: Session, shutdown: Arc<AtomicBool>) {
    let mut clock = FixedStepClock::new(
        config.target_tps,
        config.max_frame_delta,
        config.max_ticks_per_frame,
    );
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    log_loop_config(&clock, metrics_log_interval, "headless");

    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_frame_instant = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;

        let plan = clock.advance(raw_frame_dt);
        run_planned_ticks(
            &plan,
            clock.fixed_dt(),
            &mut session,
            &mut metrics_accumulator,
            InputSnapshot::empty,
        );
        report_clamp(&plan, clock.max_ticks_per_frame(), &mut metrics_accumulator);

        metrics_accumulator.record_frame(raw_frame_dt);
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            log_metrics(&snapshot);
        }
        thread::sleep(clock.fixed_dt());
    }
    info!(reason = "shutdown_flag", "shutdown_requested");
    session.shutdown();
    info!("shutdown");
}

fn scaled_window_size(width: u32, height: u32, scale: u32) -> LogicalSize<f64> {
    let scale = f64::from(scale);
    LogicalSize::new(f64::from(width) * scale, f64::from(height) * scale)
}

fn run_planned_ticks(
    plan: &StepPlan,
    fixed_dt: Duration,
    session: &mut Session,
    metrics: &mut MetricsAccumulator,
    mut next_input: impl FnMut() -> InputSnapshot,
) {
    for _ in 0..plan.ticks_to_run {
        let input = next_input();
        session.fixed_update(fixed_dt, &input);
        metrics.record_tick();
    }
}

fn report_clamp(plan: &StepPlan, max_ticks_per_frame: u32, metrics: &mut MetricsAccumulator) {
    if plan.dropped_backlog > Duration::ZERO {
        metrics.record_clamp();
        warn!(
            dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
            max_ticks_per_frame, "sim_clamp_triggered"
        );
    }
}

fn log_loop_config(clock: &FixedStepClock, metrics_log_interval: Duration, mode: &'static str) {
    info!(
        mode,
        fixed_dt_us = clock.fixed_dt().as_micros() as u64,
        max_ticks_per_frame = clock.max_ticks_per_frame(),
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        "loop_config"
    );
}

fn log_metrics(snapshot: &LoopMetricsSnapshot) {
    info!(
        fps = snapshot.fps,
        tps = snapshot.tps,
        frame_time_ms = snapshot.frame_time_ms,
        clamped_frames = snapshot.clamped_frames,
        "loop_metrics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::InputAction;
    use crate::bridge::{channel, BridgeConfig, CommandRequest};
    use crate::level::fixtures;
    use crate::session::SessionConfig;

    #[test]
    fn planned_ticks_feed_one_snapshot_each() {
        let (_handle, inbox) = channel(BridgeConfig::default());
        let mut session = Session::new(SessionConfig::default(), Arc::new(fixtures::assets()), inbox);
        let mut metrics = MetricsAccumulator::new(Duration::from_secs(1));
        let plan = StepPlan {
            ticks_to_run: 3,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: Duration::ZERO,
        };
        let mut produced = 0;
        run_planned_ticks(&plan, Duration::from_millis(16), &mut session, &mut metrics, || {
            produced += 1;
            InputSnapshot::empty().with_pressed(InputAction::TurnLeft)
        });
        assert_eq!(produced, 3);
    }

    #[test]
    fn window_size_scales_without_overflow() {
        let size = scaled_window_size(96, 80, 3);
        assert_eq!((size.width, size.height), (288.0, 240.0));

        let huge = scaled_window_size(u32::MAX, u32::MAX, u32::MAX);
        assert!(huge.width.is_finite());
        assert!(huge.width > f64::from(u32::MAX));
    }

    #[test]
    fn headless_loop_serves_bridge_until_shutdown() {
        let (handle, inbox) = channel(BridgeConfig {
            response_timeout: Duration::from_secs(5),
            ..BridgeConfig::default()
        });
        let session = Session::new(SessionConfig::default(), Arc::new(fixtures::assets()), inbox);
        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_flag = Arc::clone(&shutdown);
        let runner = thread::spawn(move || run_headless(LoopConfig::default(), session, loop_flag));

        let response = handle.execute(CommandRequest::new("is_moving"));
        assert!(!response.success);
        assert_eq!(response.message, crate::bridge::NO_LEVEL_MESSAGE);

        shutdown.store(true, Ordering::SeqCst);
        runner.join().expect("headless loop exits");
        let after = handle.execute(CommandRequest::new("is_moving"));
        assert_eq!(after.message, "Error: Simulation is not running.");
    }
}
