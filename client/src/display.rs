//! Text frames for the headless client: the tile map with entities drawn on top.

use shared::level::{render_tile_map, TileMap};
use shared::Renderable;

fn glyph(renderable: &Renderable, local_player: u32) -> char {
    match (renderable.sprite, renderable.player_id) {
        (_, Some(id)) if id == local_player => '@',
        ("player", _) => 'P',
        ("fist", _) => {
            if renderable.facing_right {
                '>'
            } else {
                '<'
            }
        }
        ("slime", _) => 's',
        _ => '?',
    }
}

/// One string per tile row. Entities are plotted at the tile under their
/// top-left corner; later entities draw over earlier ones.
pub fn render_frame(level: &TileMap, renderables: &[Renderable], local_player: u32) -> Vec<String> {
    let mut rows: Vec<Vec<char>> = render_tile_map(level)
        .into_iter()
        .map(|row| row.chars().collect())
        .collect();

    for renderable in renderables {
        let x = renderable.x.floor() as i64;
        let y = renderable.y.floor() as i64;
        if x < 0 || y < 0 {
            continue;
        }
        if let Some(cell) = rows
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *cell = glyph(renderable, local_player);
        }
    }

    rows.into_iter().map(|row| row.into_iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::level::demo_level;
    use shared::EntityId;

    fn renderable(sprite: &'static str, x: f32, y: f32, player_id: Option<u32>) -> Renderable {
        Renderable {
            id: EntityId(0),
            sprite,
            x,
            y,
            facing_right: true,
            player_id,
        }
    }

    #[test]
    fn test_entities_drawn_over_tiles() {
        let level = demo_level();
        let frame = render_frame(
            &level,
            &[
                renderable("player", 3.2, 18.0, Some(1)),
                renderable("player", 6.0, 18.0, Some(2)),
                renderable("slime", 8.9, 18.5, None),
                renderable("fist", 4.0, 18.2, None),
            ],
            1,
        );
        assert_eq!(frame.len(), 20);
        assert_eq!(&frame[18][3..9], "@> P s");
        assert!(frame[19].chars().all(|c| c == '#'));
    }

    #[test]
    fn test_off_map_entities_ignored() {
        let level = demo_level();
        let frame = render_frame(&level, &[renderable("player", -2.0, 500.0, Some(1))], 1);
        assert_eq!(frame, render_tile_map(&level));
    }
}
