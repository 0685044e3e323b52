//! Interactive 3D tree growth viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns the simulation state
//! (tree, parameters, occupancy grid, generated mesh) and implements
//! [`eframe::App`] to step, render and tweak the growth through an egui UI.

use arbor_core::{
    config::{GrowthParameters, Phyllotaxy, PhyllotaxyCycle},
    grid::OccupancyGrid,
    growth,
    mesh::{self, Mesh},
    rng::{TreeRng, create_rng},
    tree::Tree,
};
use eframe::App;
use glam::{Quat, Vec3};

const TREE_ORIGIN: Vec3 = Vec3::ZERO;
const TREE_DIRECTION: Vec3 = Vec3::Y;

/// Lower corner of the occupancy grid in world units.
const GRID_ORIGIN: Vec3 = Vec3::new(-8.0, -1.0, -8.0);
const GRID_LENGTH: i32 = 16;
const GRID_DENSITY: i32 = 4;

const AMBIENT: f32 = 0.3;
const BARK: egui::Color32 = egui::Color32::from_rgb(150, 110, 80);

/// Ring resolution per branch depth: the trunk is round-ish, twigs are boxes.
fn ring_resolution(depth: usize) -> usize {
    8 - 2 * depth.min(2)
}

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The growth core: [`Tree`], [`GrowthParameters`] and a seeded [`TreeRng`].
/// - The derived data rebuilt after every step: the skinned [`Mesh`] and
///   the [`OccupancyGrid`] contents.
/// - Camera state (zoom, pan, yaw, pitch) and step timing.
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true` and enough time has passed, call [`Viewer::step_once`].
/// 3. Render the shaded mesh and, optionally, the occupied cells.
pub struct Viewer {
    tree: Tree,
    params: GrowthParameters,
    seed: u64,
    rng: TreeRng,
    /// External light signal fed to every tick.
    light: f32,

    mesh: Mesh,
    grid: OccupancyGrid,
    show_occupancy: bool,

    running: bool,
    zoom: f32,
    pan: egui::Vec2,
    yaw: f32,
    pitch: f32,

    params_path: String,
    status: Option<String>,

    ticks: u64,
    step_interval: f64,
    last_step_time: f64,
    last_step_dt: f64,
}

impl Viewer {
    /// Creates a viewer with a fresh seedling grown from `params`.
    pub fn new(params: GrowthParameters) -> Self {
        let seed = 1;
        let mut rng = create_rng(seed);
        let tree = Tree::new(TREE_ORIGIN, TREE_DIRECTION, &params, &mut rng);

        let mut viewer = Self {
            tree,
            params,
            seed,
            rng,
            light: 1.0,
            mesh: Mesh::default(),
            grid: OccupancyGrid::new(GRID_ORIGIN, GRID_LENGTH, GRID_LENGTH, GRID_LENGTH, GRID_DENSITY),
            show_occupancy: false,
            running: false,
            zoom: 60.0,
            pan: egui::vec2(0.0, 150.0),
            yaw: 0.0,
            pitch: 0.2,
            params_path: String::new(),
            status: None,
            ticks: 0,
            step_interval: 0.05,
            last_step_time: 0.0,
            last_step_dt: 0.0,
        };
        viewer.rebuild();
        viewer
    }

    /// Restarts growth from a seedling with the current seed and parameters.
    /// Camera settings are kept; auto-running stops.
    fn reset(&mut self) {
        self.rng = create_rng(self.seed);
        self.tree
            .reset(TREE_ORIGIN, TREE_DIRECTION, &self.params, &mut self.rng);
        self.ticks = 0;
        self.running = false;
        self.rebuild();
    }

    /// Advances the growth by one tick and rebuilds the mesh and occupancy.
    ///
    /// Invalid parameters stop auto-running instead of stepping.
    fn step_once(&mut self) {
        if let Err(err) = self.params.validate() {
            log::warn!("not stepping: {err}");
            self.status = Some(err.to_string());
            self.running = false;
            return;
        }

        growth::tick(&mut self.tree, self.light, &self.params, &mut self.rng);
        self.ticks += 1;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.mesh = mesh::generate(&self.tree, ring_resolution);

        self.grid.clear();
        let occupied = self.tree.rasterize(&self.grid);
        self.grid.set_occupied(&occupied);
    }

    fn load_params(&mut self) {
        match GrowthParameters::load(&self.params_path) {
            Ok(params) => {
                log::info!("loaded growth parameters from {}", self.params_path);
                self.params = params;
                self.status = None;
                self.reset();
            }
            Err(err) => {
                log::error!("{}: {err}", self.params_path);
                self.status = Some(err.to_string());
            }
        }
    }

    fn view_rotation(&self) -> Quat {
        Quat::from_rotation_x(self.pitch) * Quat::from_rotation_y(self.yaw)
    }

    /// Maps a view-space point to the screen, dropping its depth.
    fn view_to_screen(&self, v: Vec3, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + v.x * self.zoom + self.pan.x,
            center.y - v.y * self.zoom + self.pan.y,
        )
    }

    /// Converts a world-space position to screen-space.
    ///
    /// The point is rotated into view space by yaw and pitch, projected
    /// orthographically, scaled by `zoom`, offset by `pan`, and centered
    /// inside `rect`. The y-axis is flipped so that positive y goes up.
    fn world_to_screen(&self, p: Vec3, rect: egui::Rect) -> egui::Pos2 {
        self.view_to_screen(self.view_rotation() * p, rect)
    }

    /// Converts a screen-space position back to the world-space point on
    /// the view plane through the origin.
    ///
    /// This is the inverse of [`Viewer::world_to_screen`] for points on
    /// that plane (up to floating point rounding).
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec3 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        self.view_rotation().inverse() * Vec3::new(x, y, 0.0)
    }

    /// Helper to draw a labeled `f32` [`egui::DragValue`].
    fn labeled_drag_f32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f32,
        range: std::ops::RangeInclusive<f32>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, reset, zoom).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(if self.running { "⏸ Pause" } else { "▶ Run" })
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.step_interval)
                        .prefix("dt target = ")
                        .range(0.01..=1.0)
                        .speed(0.01),
                );

                if ui.button("Step").clicked() {
                    let now = ctx.input(|i| i.time);
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = now - self.last_step_time;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }

                ui.add(egui::DragValue::new(&mut self.seed).prefix("seed = "));

                ui.separator();
                ui.add(egui::Slider::new(&mut self.light, 0.0..=2.0).text("Light"));
                ui.add(egui::Slider::new(&mut self.zoom, 5.0..=400.0).text("Zoom"));
                ui.checkbox(&mut self.show_occupancy, "Occupancy");
            });
        });
    }

    /// Builds the bottom status bar (timing, tree and mesh sizes).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt target = {:.3} s", self.step_interval));
                ui.label(format!("dt last = {:.3} s", self.last_step_dt));
                ui.separator();
                ui.label(format!("occupied cells = {}", self.grid.occupied_len()));
                ui.label(format!(
                    "vertices = {}, triangles = {}",
                    self.mesh.vertex_count(),
                    self.mesh.triangle_count()
                ));
                ui.label(format!(
                    "branches = {}, nodes = {}",
                    self.tree.branch_count(),
                    self.tree.node_total()
                ));
                ui.label(format!("ticks = {}", self.ticks));
                if self.tree.has_reached_max_growth(&self.params) {
                    ui.label("fully grown");
                }
            });
        });
    }

    /// Builds the right-hand panel for editing and loading growth parameters.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.heading("Growth");

                ui.separator();
                let p = &mut self.params;
                Self::labeled_drag_f32(ui, "apical_dominance:", &mut p.apical_dominance, 0.0..=1.0, 0.01);
                Self::labeled_drag_f32(ui, "growth_speed:", &mut p.growth_speed, 0.0..=10.0, 0.05);
                Self::labeled_drag_f32(ui, "internode_length:", &mut p.internode_length, 0.05..=5.0, 0.01);
                Self::labeled_drag_f32(
                    ui,
                    "width_to_len_ratio:",
                    &mut p.width_to_len_growth_ratio,
                    0.0..=1.0,
                    0.005,
                );
                Self::labeled_drag_f32(ui, "initial_width:", &mut p.initial_width, 0.0..=1.0, 0.005);
                Self::labeled_drag_f32(ui, "child_width_ratio:", &mut p.child_width_ratio, 0.0..=1.0, 0.01);

                ui.separator();
                ui.label("Angles (rad)");
                Self::labeled_drag_f32(ui, "min_branching:", &mut p.min_branching_angle, 0.0..=1.57, 0.01);
                Self::labeled_drag_f32(ui, "max_branching:", &mut p.max_branching_angle, 0.0..=1.57, 0.01);
                Self::labeled_drag_f32(
                    ui,
                    "max_direction_change:",
                    &mut p.max_direction_change_angle,
                    0.0..=1.0,
                    0.01,
                );
                Self::labeled_drag_f32(ui, "apex_split:", &mut p.apex_split_angle, 0.0..=1.57, 0.01);

                ui.separator();
                ui.label("Phyllotaxy");
                egui::ComboBox::from_id_salt("phyllotaxy")
                    .selected_text(format!("{:?}", p.phyllotaxy))
                    .show_ui(ui, |ui| {
                        for kind in [Phyllotaxy::Opposite, Phyllotaxy::Alternate, Phyllotaxy::Whorled] {
                            ui.selectable_value(&mut p.phyllotaxy, kind, format!("{kind:?}"));
                        }
                    });
                egui::ComboBox::from_id_salt("phyllotaxy_cycle")
                    .selected_text(format!("{:?}", p.phyllotaxy_cycle))
                    .show_ui(ui, |ui| {
                        for cycle in [
                            PhyllotaxyCycle::Planar,
                            PhyllotaxyCycle::Decussate,
                            PhyllotaxyCycle::Spiral,
                        ] {
                            ui.selectable_value(&mut p.phyllotaxy_cycle, cycle, format!("{cycle:?}"));
                        }
                    });

                ui.separator();
                ui.label("Max length by depth");
                ui.horizontal(|ui| {
                    for len in p.branch_length_by_depth.iter_mut() {
                        ui.add(egui::DragValue::new(len).range(0..=64));
                    }
                });

                ui.separator();
                if ui.button("Reset params to default").clicked() {
                    self.params = GrowthParameters::default();
                }

                ui.horizontal(|ui| {
                    ui.text_edit_singleline(&mut self.params_path);
                    if ui.button("Load").clicked() {
                        self.load_params();
                    }
                });

                if let Err(err) = self.params.validate() {
                    ui.colored_label(egui::Color32::LIGHT_RED, err.to_string());
                } else if let Some(status) = &self.status {
                    ui.colored_label(egui::Color32::LIGHT_RED, status);
                }
            });
    }

    /// Draws the mesh as flat-shaded, back-face culled triangles sorted far
    /// to near.
    fn draw_mesh(&self, painter: &egui::Painter, rect: egui::Rect) {
        let rotation = self.view_rotation();
        let light = Vec3::new(0.4, 0.6, 0.7).normalize();
        let view: Vec<Vec3> = self.mesh.vertices.iter().map(|&v| rotation * v).collect();

        let mut faces: Vec<(f32, [u32; 3], f32)> = Vec::with_capacity(self.mesh.triangle_count());
        for &tri in &self.mesh.triangles {
            let [a, b, c] = tri.map(|i| view[i as usize]);
            let Some(normal) = (b - a).cross(c - a).try_normalize() else {
                continue;
            };
            if normal.z <= 0.0 {
                continue;
            }
            let shade = AMBIENT + (1.0 - AMBIENT) * normal.dot(light).max(0.0);
            faces.push(((a.z + b.z + c.z) / 3.0, tri, shade));
        }
        faces.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut shape = egui::epaint::Mesh::default();
        for (_, tri, shade) in faces {
            let color = egui::Color32::from_rgb(
                (BARK.r() as f32 * shade) as u8,
                (BARK.g() as f32 * shade) as u8,
                (BARK.b() as f32 * shade) as u8,
            );
            let base = shape.vertices.len() as u32;
            for i in tri {
                shape.colored_vertex(self.view_to_screen(view[i as usize], rect), color);
            }
            shape.add_triangle(base, base + 1, base + 2);
        }
        painter.add(egui::Shape::mesh(shape));
    }

    /// Builds the central panel where the tree is drawn and the camera is driven.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            // Pan with the primary button, orbit with the secondary one.
            if response.dragged_by(egui::PointerButton::Primary) {
                self.pan += response.drag_delta();
            }
            if response.dragged_by(egui::PointerButton::Secondary) {
                let delta = response.drag_delta();
                self.yaw += delta.x * 0.01;
                self.pitch = (self.pitch + delta.y * 0.01).clamp(-1.5, 1.5);
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(5.0, 400.0);

                let screen_after = self.world_to_screen(world_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            self.draw_mesh(&painter, rect);

            if self.show_occupancy {
                for cell in self.grid.occupied_cells() {
                    let p = self.world_to_screen(self.grid.grid_to_world(cell), rect);
                    painter.circle_filled(p, 1.5, egui::Color32::LIGHT_BLUE);
                }
            }

            // Auto-run growth if requested.
            if self.running {
                let now = ctx.input(|i| i.time);
                let elapsed = now - self.last_step_time;
                if elapsed >= self.step_interval {
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = elapsed;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rect() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::new(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    #[test]
    fn world_to_screen_and_back_is_roundtrip() {
        let mut viewer = Viewer::new(GrowthParameters::default());
        viewer.zoom = 2.0;
        viewer.pan = egui::vec2(15.0, -7.0);
        viewer.yaw = 0.7;
        viewer.pitch = -0.3;
        let rect = test_rect();

        let rotation = viewer.view_rotation().inverse();
        let view_plane_points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, -5.0, 0.0),
            Vec3::new(-3.5, 8.25, 0.0),
        ];

        for v in view_plane_points {
            let p = rotation * v;
            let screen = viewer.world_to_screen(p, rect);
            let back = viewer.screen_to_world(screen, rect);
            assert!((back - p).length() < 1e-4, "roundtrip mismatch: p={p:?}, back={back:?}");
        }
    }

    #[test]
    fn reset_restores_basic_state() {
        let mut viewer = Viewer::new(GrowthParameters::default());
        viewer.params.growth_speed = 5.0;
        for _ in 0..200 {
            viewer.step_once();
        }
        viewer.running = true;
        assert!(viewer.tree.node_total() > 2);

        viewer.reset();

        assert_eq!(viewer.tree.branch_count(), 1);
        assert_eq!(viewer.tree.node_total(), 2);
        assert_eq!(viewer.ticks, 0);
        assert!(!viewer.running);
        assert_eq!(viewer.mesh.vertex_count(), 2 * ring_resolution(0));
    }

    #[test]
    fn step_once_rebuilds_derived_data() {
        let mut viewer = Viewer::new(GrowthParameters {
            growth_speed: 4.0,
            ..GrowthParameters::default()
        });

        for _ in 0..50 {
            viewer.step_once();
        }

        assert_eq!(viewer.ticks, 50);
        assert!(viewer.tree.root().nodes().len() > 1);
        assert_eq!(
            mesh::topology_counts(&viewer.tree, ring_resolution),
            (viewer.mesh.vertex_count(), viewer.mesh.triangle_count())
        );
        assert!(viewer.grid.occupied_len() > 0);
    }

    #[test]
    fn same_seed_regrows_the_same_tree() {
        let mut viewer = Viewer::new(GrowthParameters::default());
        for _ in 0..100 {
            viewer.step_once();
        }
        let first = viewer.mesh.clone();

        viewer.reset();
        for _ in 0..100 {
            viewer.step_once();
        }
        assert_eq!(viewer.mesh, first);
    }

    #[test]
    fn invalid_params_stop_running() {
        let mut viewer = Viewer::new(GrowthParameters::default());
        viewer.params.internode_length = 0.0;
        viewer.running = true;

        viewer.step_once();

        assert!(!viewer.running);
        assert_eq!(viewer.ticks, 0);
        assert!(viewer.status.is_some());
    }
}
