use mosaic_engine::assets::{MemoryLoader, PixelBuffer};
use mosaic_engine::cache::filters::{AlphaMaskFilter, ColorFilter};
use mosaic_engine::cache::{CacheOptions, Filter, SurfaceKind};
use mosaic_engine::coords::Rect;
use mosaic_engine::error::RenderError;
use mosaic_engine::paint::Color;
use mosaic_engine::render::{BatchReason, HeadlessBackend, RenderTarget, Stage, StageConfig};
use mosaic_engine::scene::{Frame, Node, Scene};
use proptest::prelude::*;

const RED: [u8; 4] = [255, 0, 0, 255];

fn stage_with(config: StageConfig) -> Stage<HeadlessBackend> {
    let mut stage = Stage::new(HeadlessBackend::new(64, 64), MemoryLoader::new(), config).unwrap();
    stage.update_viewport(64, 64);
    stage
}

fn stage() -> Stage<HeadlessBackend> {
    stage_with(StageConfig::default())
}

fn solid(w: u32, h: u32, px: [u8; 4]) -> PixelBuffer {
    PixelBuffer::filled(w, h, Color::from_rgba8(px[0], px[1], px[2], px[3]))
}

/// Reports a fixed expansion and leaves pixels alone.
#[derive(Debug)]
struct Pad(Rect);

impl Filter for Pad {
    fn bounds(&self) -> Option<Rect> {
        Some(self.0)
    }
}

// ── batching ──

#[test]
fn one_sprite_is_one_draw() {
    let mut stage = stage();
    stage.insert_image("red", solid(8, 8, RED));
    let mut scene = Scene::new();
    scene.add(Node::raw_image("red").at(4.0, 4.0));

    stage.update(&mut scene).unwrap();

    let draws = stage.backend().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].cards(), 1);
    assert_eq!(draws[0].target, RenderTarget::Screen);
    assert_eq!(stage.batch_stats().last_reason, Some(BatchReason::DrawFinish));
    assert_eq!(stage.backend().screen().pixel(6, 6), RED);
    assert_eq!(stage.backend().screen().pixel(20, 20), [0; 4]);
}

#[test]
fn full_batch_splits_into_two_draws() {
    let mut stage = stage_with(StageConfig { max_cards_per_batch: 6000, ..StageConfig::default() });
    stage.insert_image("dot", solid(1, 1, RED));
    let mut scene = Scene::new();
    for i in 0..6001 {
        scene.add(Node::raw_image("dot").at((i % 64) as f32, (i / 64 % 64) as f32));
    }

    stage.update(&mut scene).unwrap();

    let cards: Vec<usize> = stage.backend().draws().iter().map(|d| d.cards()).collect();
    assert_eq!(cards, vec![6000, 1]);
    assert_eq!(stage.batch_stats().vertex_overflows, 1);
    assert_eq!(stage.batch_stats().cards, 6001);
}

#[test]
fn exhausted_slots_flush_the_batch() {
    let mut stage = stage_with(StageConfig { texture_slots: 2, ..StageConfig::default() });
    for key in ["a", "b", "c"] {
        stage.insert_image(key, solid(2, 2, RED));
    }
    let mut scene = Scene::new();
    for key in ["a", "b", "c"] {
        scene.add(Node::raw_image(key));
    }

    stage.update(&mut scene).unwrap();

    let cards: Vec<usize> = stage.backend().draws().iter().map(|d| d.cards()).collect();
    assert_eq!(cards, vec![2, 1]);
    assert_eq!(stage.batch_stats().texture_overflows, 1);
}

#[test]
fn slots_are_stable_across_draws() {
    let mut stage = stage();
    stage.insert_image("a", solid(2, 2, RED));
    stage.insert_image("b", solid(2, 2, RED));
    let mut scene = Scene::new();
    scene.add(Node::raw_image("a"));
    scene.add(Node::raw_image("b"));

    stage.update(&mut scene).unwrap();
    let first = (stage.slots().slot_of(&"a".into()), stage.slots().slot_of(&"b".into()));
    stage.update(&mut scene).unwrap();
    let second = (stage.slots().slot_of(&"a".into()), stage.slots().slot_of(&"b".into()));

    assert!(first.0.is_some() && first.1.is_some());
    assert_ne!(first.0, first.1);
    assert_eq!(first, second);
}

#[test]
fn alpha_multiplies_down_the_tree() {
    let mut stage = stage();
    stage.insert_image("red", solid(2, 2, RED));
    let mut scene = Scene::new();
    let mut parent = Node::container();
    parent.alpha = 0.5;
    let parent = scene.add(parent);
    let mut child = Node::raw_image("red");
    child.alpha = 0.5;
    scene.add_child(parent, child).unwrap();

    stage.update(&mut scene).unwrap();

    let draw = &stage.backend().draws()[0];
    assert!(draw.alphas.iter().all(|a| (*a - 0.25).abs() < 1e-6));
}

#[test]
fn hidden_and_transparent_nodes_draw_nothing() {
    let mut stage = stage();
    stage.insert_image("red", solid(2, 2, RED));
    let mut scene = Scene::new();
    let mut hidden = Node::raw_image("red");
    hidden.visible = false;
    scene.add(hidden);
    let mut clear = Node::raw_image("red");
    clear.alpha = 0.0;
    scene.add(clear);
    let mut flat = Node::raw_image("red");
    flat.transform.scale_y = 0.0;
    scene.add(flat);

    stage.update(&mut scene).unwrap();

    assert!(stage.backend().draws().is_empty());
}

#[test]
fn pending_image_samples_placeholder_until_loaded() {
    let loader = MemoryLoader::new().with_image("sheet", solid(16, 8, RED));
    let mut stage = Stage::new(HeadlessBackend::new(64, 64), loader, StageConfig::default()).unwrap();
    stage.update_viewport(64, 64);
    let mut scene = Scene::new();
    scene.add(Node::textured(Frame::new("sheet", Rect::new(8.0, 0.0, 8.0, 8.0))));

    stage.update(&mut scene).unwrap();
    stage.update(&mut scene).unwrap();

    let placeholder = stage.slots().placeholder();
    let slot = stage.slots().slot_of(&"sheet".into()).unwrap();
    let draws = stage.backend().draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].textures[slot], placeholder);
    assert_ne!(draws[1].textures[slot], placeholder);
    assert_eq!(&draws[1].uvs[..2], &[0.5, 0.0]);
    assert_eq!(stage.backend().screen().pixel(4, 4), RED);
}

#[test]
fn failing_program_stops_stage_creation() {
    let backend = HeadlessBackend::new(8, 8).fail_programs_above(4);
    let err = Stage::new(backend, MemoryLoader::new(), StageConfig::default()).err().unwrap();
    assert!(matches!(err.downcast_ref::<RenderError>(), Some(RenderError::ShaderCompile { slots: 8, .. })));
}

#[test]
fn slot_count_is_clamped_to_backend_units() {
    let backend = HeadlessBackend::new(8, 8).with_max_texture_units(3);
    let stage = Stage::new(backend, MemoryLoader::new(), StageConfig::default()).unwrap();
    assert_eq!(stage.slots().len(), 3);
    assert_eq!(stage.backend().programs()[0].slot_count, 3);
}

// ── caching ──

#[test]
fn cache_surface_is_scaled() {
    let mut stage = stage();
    let mut scene = Scene::new();
    let id = scene.add(Node::container());

    assert!(stage.cache(&mut scene, id, Rect::new(0.0, 0.0, 100.0, 100.0), 2.0, CacheOptions::default()).unwrap());

    let record = stage.cache_record(id).unwrap();
    assert_eq!(record.surface().unwrap().size(), (200, 200));
    assert_eq!(stage.cache_bounds(id), Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
}

#[test]
fn every_update_bumps_cache_id() {
    let mut stage = stage();
    let mut scene = Scene::new();
    let id = scene.add(Node::container());

    stage.cache(&mut scene, id, Rect::new(0.0, 0.0, 10.0, 10.0), 1.0, CacheOptions::default()).unwrap();
    assert_eq!(stage.cache_record(id).unwrap().cache_id(), 1);
    stage.update_cache(&mut scene, id, None).unwrap();
    stage.update_cache(&mut scene, id, None).unwrap();
    assert_eq!(stage.cache_record(id).unwrap().cache_id(), 3);
}

#[test]
fn filter_bounds_grow_the_surface() {
    let mut stage = stage();
    let mut scene = Scene::new();
    let id = scene.add(
        Node::container()
            .with_filter(Pad(Rect::new(-5.0, 0.0, 10.0, 10.0)))
            .with_filter(Pad(Rect::new(0.0, -3.0, 6.0, 6.0))),
    );

    stage.cache(&mut scene, id, Rect::new(0.0, 0.0, 20.0, 20.0), 1.0, CacheOptions::default()).unwrap();

    assert_eq!(stage.cache_record(id).unwrap().surface().unwrap().size(), (31, 33));
    assert_eq!(stage.cache_bounds(id), Some(Rect::new(-5.0, -3.0, 31.0, 33.0)));
}

#[test]
fn cached_subtree_draws_as_one_card() {
    let mut stage = stage();
    stage.insert_image("red", solid(4, 4, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container().at(10.0, 10.0));
    for i in 0..5 {
        scene.add_child(group, Node::raw_image("red").at(i as f32 * 4.0, 0.0)).unwrap();
    }

    stage.update(&mut scene).unwrap();
    assert_eq!(stage.backend_mut().take_draws()[0].cards(), 5);

    stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 20.0, 4.0), 1.0, CacheOptions::default()).unwrap();
    stage.update(&mut scene).unwrap();

    let draws = stage.backend().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].cards(), 1);
    assert_eq!(stage.backend().screen().pixel(28, 12), RED);
}

#[test]
fn disabling_a_cache_keeps_the_picture() {
    let mut stage = stage();
    stage.insert_image("red", solid(8, 8, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container().at(10.0, 10.0));
    scene.add_child(group, Node::raw_image("red")).unwrap();
    stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 8.0, 8.0), 1.0, CacheOptions::default()).unwrap();

    stage.update(&mut scene).unwrap();
    let cached = stage.backend().screen().clone();
    let retained = stage.cache_record(group).unwrap().surface().and_then(|s| s.pixels()).cloned();
    assert!(retained.is_some());

    stage.set_cache_disabled(group, true).unwrap();
    assert!(stage.cache_record(group).unwrap().surface().is_none());
    assert_eq!(stage.cache_data_url(group).unwrap(), None);
    stage.update(&mut scene).unwrap();
    let live = stage.backend().screen().clone();

    stage.set_cache_disabled(group, false).unwrap();
    let restored = stage.cache_record(group).unwrap().surface().and_then(|s| s.pixels()).cloned();
    assert_eq!(restored, retained);
    stage.update(&mut scene).unwrap();

    assert_eq!(live, cached);
    assert_eq!(stage.backend().screen(), &cached);
    assert_eq!(cached.pixel(12, 12), RED);
}

#[test]
fn gpu_surface_renders_through_the_batch() {
    let mut stage = stage();
    stage.insert_image("red", solid(4, 4, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container());
    scene.add_child(group, Node::raw_image("red")).unwrap();

    let options = CacheOptions { surface: SurfaceKind::Gpu };
    assert!(stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, options).unwrap());

    let texture = stage.cache_record(group).unwrap().surface().unwrap().texture().unwrap();
    assert_eq!(stage.backend().draws()[0].target, RenderTarget::Texture(texture));
    assert_eq!(stage.backend().texture(texture).unwrap().pixel(1, 1), RED);
}

#[test]
fn filters_recolor_the_cache() {
    let mut stage = stage();
    stage.insert_image("red", solid(4, 4, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container().with_filter(ColorFilter::new([0.0, 1.0, 1.0, 1.0], [0.0, 255.0, 0.0, 0.0])));
    scene.add_child(group, Node::raw_image("red")).unwrap();

    stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, CacheOptions::default()).unwrap();
    stage.update(&mut scene).unwrap();

    assert_eq!(stage.backend().screen().pixel(1, 1), [0, 255, 0, 255]);
}

#[test]
fn unreadable_surface_skips_filters() {
    let mut stage = stage();
    stage.insert_image("red", solid(4, 4, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container().with_filter(ColorFilter::tint(0.0, 1.0, 1.0)));
    scene.add_child(group, Node::raw_image("red")).unwrap();
    stage.backend_mut().set_fail_readback(true);

    let options = CacheOptions { surface: SurfaceKind::Gpu };
    let filtered = stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, options).unwrap();

    assert!(!filtered);
    let record = stage.cache_record(group).unwrap();
    assert_eq!(record.cache_id(), 0);
    assert!(!record.is_drawable());
}

#[test]
fn tainted_canvas_skips_filters() {
    let mut stage = stage();
    let mut foreign = solid(4, 4, RED);
    foreign.set_readable(false);
    stage.insert_image("foreign", foreign);
    let mut scene = Scene::new();
    let group = scene.add(Node::container().with_filter(ColorFilter::tint(0.0, 1.0, 1.0)));
    scene.add_child(group, Node::raw_image("foreign")).unwrap();

    let filtered = stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, CacheOptions::default()).unwrap();

    assert!(!filtered);
    assert_eq!(stage.cache_record(group).unwrap().cache_id(), 0);
}

#[test]
fn failed_filters_leave_the_rendered_cache() {
    let mut stage = stage();
    let mut foreign = solid(4, 4, RED);
    foreign.set_readable(false);
    stage.insert_image("foreign", foreign);
    let mut scene = Scene::new();
    let group = scene.add(
        Node::container()
            .with_filter(AlphaMaskFilter::new(PixelBuffer::new(4, 4)))
            .with_filter(ColorFilter::tint(0.0, 1.0, 1.0)),
    );
    scene.add_child(group, Node::raw_image("foreign")).unwrap();

    let filtered = stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, CacheOptions::default()).unwrap();

    assert!(!filtered);
    let surface = stage.cache_record(group).unwrap().surface().unwrap();
    assert_eq!(surface.pixels().unwrap().pixel(1, 1), RED);
}

#[test]
fn cache_errors_are_reported() {
    let mut stage = stage();
    let mut scene = Scene::new();
    let id = scene.add(Node::container());
    let gone = scene.add(Node::container());
    scene.remove(gone);

    assert!(matches!(
        stage.cache(&mut scene, gone, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0, CacheOptions::default()),
        Err(RenderError::NoTarget)
    ));
    assert!(matches!(stage.update_cache(&mut scene, id, None), Err(RenderError::CacheNotDefined)));
    assert!(matches!(stage.set_cache_disabled(id, true), Err(RenderError::CacheNotDefined)));
}

#[test]
fn removed_node_releases_its_cache() {
    let mut stage = stage();
    let mut scene = Scene::new();
    let id = scene.add(Node::container());
    stage.cache(&mut scene, id, Rect::new(0.0, 0.0, 16.0, 16.0), 1.0, CacheOptions::default()).unwrap();
    let live = stage.backend().live_textures();

    scene.remove(id);
    stage.update(&mut scene).unwrap();

    assert!(stage.cache_record(id).is_none());
    assert_eq!(stage.backend().live_textures(), live - 1);
}

#[test]
fn cache_exports_a_png_data_url() {
    let mut stage = stage();
    stage.insert_image("red", solid(2, 2, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container());
    scene.add_child(group, Node::raw_image("red")).unwrap();

    assert_eq!(stage.cache_data_url(group).unwrap(), None);
    stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 2.0, 2.0), 1.0, CacheOptions::default()).unwrap();

    let url = stage.cache_data_url(group).unwrap().unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
    assert_eq!(stage.cache_data_url(group).unwrap(), Some(url));
}

#[test]
fn dispose_frees_every_texture() {
    let mut stage = stage();
    stage.insert_image("red", solid(2, 2, RED));
    let mut scene = Scene::new();
    let group = scene.add(Node::container());
    scene.add_child(group, Node::raw_image("red")).unwrap();
    stage.cache(&mut scene, group, Rect::new(0.0, 0.0, 2.0, 2.0), 1.0, CacheOptions::default()).unwrap();
    stage.update(&mut scene).unwrap();

    stage.dispose();

    assert_eq!(stage.backend().live_textures(), 0);
}

// ── properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn draws_never_exceed_the_batch_size(count in 1usize..200, max in 1usize..40) {
        let mut stage = stage_with(StageConfig { max_cards_per_batch: max, ..StageConfig::default() });
        stage.insert_image("dot", solid(1, 1, RED));
        let mut scene = Scene::new();
        for i in 0..count {
            scene.add(Node::raw_image("dot").at((i % 64) as f32, 0.0));
        }

        stage.update(&mut scene).unwrap();

        let draws = stage.backend().draws();
        prop_assert!(draws.iter().all(|d| d.cards() <= max));
        prop_assert_eq!(draws.iter().map(|d| d.cards()).sum::<usize>(), count);
        prop_assert_eq!(draws.len(), count.div_ceil(max));
    }
}
