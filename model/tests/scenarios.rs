use std::rc::Rc;

use config::{Color, Colorway, Layout, LegendStyle, State};
use glam::vec2;
use model::{
    build_case, geometry::flip_v, key_instances, CaseSettings, Controller, KeySet, Keyboard,
    KeyModel,
};
use store::Store;

const WHITE: [u8; 4] = [255, 255, 255, 255];

fn tkl_shaped_layout() -> Layout {
    let mut rows = vec![vec![1.0; 18]];
    rows.push([vec![1.0; 4], vec![0.0], vec![1.0; 4], vec![0.0], vec![1.0; 8]].concat());
    rows.push([vec![1.5], vec![1.0; 11], vec![1.5], vec![0.0], vec![1.0; 3]].concat());
    rows.push([vec![1.75], vec![1.0; 11], vec![2.25]].concat());
    rows.push([vec![2.25], vec![1.0; 10], vec![2.75], vec![0.0; 5], vec![1.0]].concat());
    rows.push([vec![1.25; 3], vec![6.25], vec![1.25; 3], vec![0.0], vec![1.0; 3]].concat());

    Layout::new(18.0, 6.5, rows)
}

/// Counts the contiguous runs of present keys in every row.
fn contiguous_runs(layout: &Layout) -> usize {
    layout
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(std::iter::once(&0.0).chain(row.iter()))
                .filter(|(width, previous)| **width > 0.0 && **previous <= 0.0)
                .count()
        })
        .sum()
}

fn key<'a>(keyboard: &'a Keyboard, code: &str) -> &'a KeyModel {
    keyboard
        .keys()
        .iter()
        .find(|model| model.key.instance.code == code)
        .unwrap()
}

#[test]
fn rows_never_overflow_the_case_outline() {
    for name in Layout::names().unwrap() {
        let layout = Layout::named(&name).unwrap();
        layout.validate().unwrap();

        for row in 0..layout.rows.len() {
            assert!(layout.row_extent(row) <= layout.width + config::EPSILON);
        }
    }
}

#[test]
fn rounded_case_spans_layout_with_one_hole_per_run() {
    let layout = tkl_shaped_layout();
    let case = build_case(&layout, config::CaseStyle::Rounded, &CaseSettings::default()).unwrap();
    let bounds = case.mesh.bounds().unwrap();

    assert!((bounds.size().x - 19.0).abs() < 1e-4);
    assert!((bounds.size().y - 7.5).abs() < 1e-4);
    assert_eq!(case.hole_count, contiguous_runs(&layout));
    assert_eq!(case.hole_count, 11);
}

#[test]
fn case_rebuilds_are_identical() {
    let layout = tkl_shaped_layout();

    for style in [config::CaseStyle::Rounded, config::CaseStyle::Sharp] {
        let first = build_case(&layout, style, &CaseSettings::default()).unwrap();
        let second = build_case(&layout, style, &CaseSettings::default()).unwrap();

        assert_eq!(first.mesh.vertex_count(), second.mesh.vertex_count());
        assert_eq!(first.mesh.bounds(), second.mesh.bounds());
    }
}

#[test]
fn case_color_change_swaps_material_only() {
    let store = Store::new(&State::default()).unwrap();
    let mut controller = Controller::new(store.clone()).unwrap();
    let mesh = controller.keyboard().case().mesh.clone();
    let (vertices, triangles) = (mesh.vertex_count(), mesh.triangle_count());

    store.update_state("case.primaryColor", "#ff0000").unwrap();
    let changes = controller.poll().unwrap();

    let case = controller.keyboard().case();
    assert!(changes.case_material);
    assert!(!changes.case_geometry && !changes.keys_geometry);
    assert_eq!(case.color, Color::rgb(255, 0, 0));
    assert!(Rc::ptr_eq(&mesh, &case.mesh));
    assert_eq!(case.mesh.vertex_count(), vertices);
    assert_eq!(case.mesh.triangle_count(), triangles);
}

#[test]
fn colorway_change_keeps_cached_legends() {
    let mut state = State::default();
    state.colorways.active = "ocean".to_owned();
    let store = Store::new(&state).unwrap();
    let mut controller = Controller::new(store.clone()).unwrap();

    let letter = key(controller.keyboard(), "KeyA").materials.top.clone();
    let escape = key(controller.keyboard(), "Escape").materials.top.clone();
    assert_eq!(
        key(controller.keyboard(), "KeyA").materials.top_key,
        model::TextureKey::Legend(model::LegendKey::new(
            "KeyA",
            LegendStyle::Cherry,
            Color::rgb(0x4a, 0x90, 0xe2),
            glam::DVec2::ONE,
            glam::DVec2::ZERO,
        ))
    );

    let mut custom = Colorway::named("ocean").unwrap();
    custom.swatches.accent.background = Color::rgb(0x8e, 0x24, 0xaa);
    store.update_state("colorways.custom.mine", &custom).unwrap();
    store.update_state("colorways.active", "mine").unwrap();
    let changes = controller.poll().unwrap();

    assert!(changes.keys_material && !changes.keys_geometry);
    let keyboard = controller.keyboard();
    assert!(Rc::ptr_eq(&letter, &key(keyboard, "KeyA").materials.top));
    assert!(!Rc::ptr_eq(&escape, &key(keyboard, "Escape").materials.top));

    controller.force_rebuild().unwrap();
    assert!(!Rc::ptr_eq(
        &letter,
        &key(controller.keyboard(), "KeyA").materials.top
    ));
}

#[test]
fn bottom_row_produces_one_keycap_per_key() {
    let layout = Layout::new(
        15.0,
        1.0,
        vec![vec![1.25, 1.25, 1.25, 6.25, 1.25, 1.25, 1.25, 1.25]],
    );

    let keys = KeySet::build(&layout).unwrap();
    assert_eq!(keys.keycap_meshes().count(), 8);
    assert_eq!(keys.switch_meshes().count(), 8);

    let instances = key_instances(&layout);
    let space = instances
        .iter()
        .find(|instance| (instance.unit_width - 6.25).abs() < f64::EPSILON)
        .unwrap();
    let span_start = -7.5 + 3.0 * 1.25;
    assert!((space.position.x - (span_start + 6.25 / 2.0)).abs() < 1e-9);

    let (_, position) = keys.keycap_meshes().nth(3).unwrap();
    assert!((f64::from(position.x) - space.position.x).abs() < 1e-6);
}

#[test]
fn legends_face_the_right_way_up() {
    let mut state = State::default();
    state.keys.legend_primary_style = LegendStyle::Sa;
    let keyboard = Keyboard::from_state(&state).unwrap();
    let model = key(&keyboard, "KeyA");
    let (mesh, texture) = (&model.key.keycap, &model.materials.top);

    // Sa legends sit in the top left of the raster, which has to end up at the rear left of
    // the keycap, i.e. at negative X and positive Y
    let (width, height) = (texture.width(), texture.height());
    let mut legend_pixels = 0;
    for y in 0..height {
        for x in 0..width {
            if texture.pixel(x, y) != WHITE {
                continue;
            }
            legend_pixels += 1;

            #[allow(clippy::cast_precision_loss)]
            let stored = vec2(
                (x as f32 + 0.5) / width as f32,
                (y as f32 + 0.5) / height as f32,
            );
            let authored = flip_v(stored);
            assert!(authored.x < 0.6 && authored.y > 0.4);
        }
    }
    assert!(legend_pixels > 0);

    let top = mesh.groups[0];
    let top_vertices: Vec<usize> = (top.start..top.start + top.count)
        .map(|index| mesh.indices[index] as usize)
        .collect();
    let corner = |score: fn(glam::Vec3) -> f32| {
        *top_vertices
            .iter()
            .max_by(|a, b| score(mesh.positions[**a]).total_cmp(&score(mesh.positions[**b])))
            .unwrap()
    };
    let rear_left = mesh.uvs[corner(|position| position.y - position.x)];
    let front_right = mesh.uvs[corner(|position| position.x - position.y)];

    // Walking from the rear left corner towards the center crosses the legend
    let center = vec2(0.5, 0.5);
    let crosses_legend = |start: glam::Vec2| {
        (0..=50).any(|step| {
            #[allow(clippy::cast_precision_loss)]
            let t = step as f32 / 50.0;
            texture.sample(start.lerp(center, t * 0.9)) == WHITE
        })
    };
    assert!(crosses_legend(rear_left));
    assert!(!crosses_legend(front_right));
}
