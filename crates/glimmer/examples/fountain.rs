//! A particle fountain, a trail circling it and a burst on Space.
//!
//! Press L to simulate a lost device and watch everything come back.

use std::sync::Arc;

use glimmer::math::convention::mul4;
use glimmer::math::matrix::identity4;
use glimmer::math::transform::{camera_look_at, look_at, perspective};
use glimmer::prelude::*;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

struct Scene {
    backend: WgpuBackend,
    programs: ProgramCache,
    particles: ParticleSystem,
    burst: OneShotId,
    trail: TrailId,
}

impl Scene {
    fn new(window: Arc<Window>) -> glimmer::Result<Self> {
        let size = window.inner_size();
        let mut backend = WgpuBackend::with_surface(window, size.width, size.height, BackendConfig::default())?;
        let mut programs = ProgramCache::new();
        let mut particles = ParticleSystem::new(&mut backend, &mut programs)?;

        let fountain = particles.create_emitter(None);
        let spec = ParticleSpec::from_json(
            r#"{
                "num_particles": 800,
                "life_time": 2.5,
                "life_time_range": 0.5,
                "start_size": 0.2,
                "end_size": 0.6,
                "velocity": [0, 6, 0],
                "velocity_range": [1.2, 0.6, 1.2],
                "world_acceleration": [0, -4.5, 0],
                "color_mult": [0.6, 0.8, 1.0, 1.0],
                "spin_speed_range": 4
            }"#,
        )?;
        particles.set_parameters(&mut backend, fountain, spec, None)?;
        particles.emitter_mut(fountain)?.set_blend(BlendMode::Additive);

        let burst_emitter: EmitterId = particles.create_emitter(None);
        let burst_spec = ParticleSpec {
            num_particles: 120,
            start_time: Some(0.0),
            life_time: 1.2,
            time_range: 1.2,
            start_size: 0.4,
            end_size: 1.5,
            velocity_range: [4.0, 4.0, 4.0],
            color_mult: [1.0, 0.6, 0.2, 1.0],
            ..Default::default()
        };
        particles.set_parameters(&mut backend, burst_emitter, burst_spec, None)?;
        particles.set_color_ramp(
            &mut backend,
            burst_emitter,
            &[1.0, 1.0, 0.6, 1.0, 1.0, 0.4, 0.1, 0.8, 0.2, 0.0, 0.0, 0.0],
        )?;
        let burst = particles.create_one_shot(burst_emitter)?;

        let trail_spec = ParticleSpec {
            num_particles: 4,
            life_time: 1.5,
            start_size: 0.3,
            end_size: 0.05,
            velocity_range: [0.2, 0.2, 0.2],
            color_mult: [0.9, 0.3, 1.0, 1.0],
            ..Default::default()
        };
        let trail = particles.create_trail(&mut backend, 600, trail_spec, None, None)?;

        Ok(Self { backend, programs, particles, burst, trail })
    }

    fn frame(&mut self) -> glimmer::Result<()> {
        if self.backend.is_context_lost() {
            self.recover()?;
        }
        let t = self.particles.now();
        let position = [4.0 * t.cos(), 1.0, 4.0 * t.sin()];
        self.particles.birth_particles(&mut self.backend, self.trail, position)?;

        let (width, height) = self.backend.default_target_size();
        let eye = [0.0, 6.0, 14.0];
        let projection = perspective(60f32.to_radians(), width as f32 / height.max(1) as f32, 0.1, 100.0);
        let view = look_at(eye, [0.0, 2.0, 0.0], [0.0, 1.0, 0.0]);
        let view_inverse = camera_look_at(eye, [0.0, 2.0, 0.0], [0.0, 1.0, 0.0]);
        let view_projection = mul4::<RowMajor>(view, projection);

        self.backend.begin_frame()?;
        self.backend.clear(RenderTarget::Default, Some([0.02, 0.02, 0.05, 1.0]), Some(1.0))?;
        self.particles
            .draw(&mut self.backend, RenderTarget::Default, view_projection, identity4(), view_inverse)?;
        self.backend.end_frame();
        Ok(())
    }

    fn recover(&mut self) -> glimmer::Result<()> {
        log::info!("recovering from lost context");
        self.backend.restore_context()?;
        self.programs.recover(&mut self.backend)?;
        self.particles.recover_from_lost_context(&mut self.backend)?;
        Ok(())
    }
}

#[derive(Default)]
struct FountainApp {
    window: Option<Arc<Window>>,
    scene: Option<Scene>,
}

impl ApplicationHandler for FountainApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title("glimmer fountain")
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attrs).expect("Failed to create window"));
        match Scene::new(window.clone()) {
            Ok(scene) => self.scene = Some(scene),
            Err(e) => {
                log::error!("failed to set up the scene: {e}");
                event_loop.exit();
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(scene) = &mut self.scene else { return };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => scene.backend.resize(size.width, size.height),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed && !event.repeat => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Space) => {
                        let t = scene.particles.now();
                        let at = [3.0 * (t * 1.7).sin(), 3.0, 3.0 * (t * 1.3).cos()];
                        if let Err(e) = scene.particles.trigger(scene.burst, Some(at), None) {
                            log::warn!("trigger failed: {e}");
                        }
                    }
                    PhysicalKey::Code(KeyCode::KeyL) => scene.backend.simulate_context_loss(),
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = scene.frame() {
                    log::warn!("frame failed: {e}");
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::init();
    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = FountainApp::default();
    event_loop.run_app(&mut app).expect("Event loop error");
}
