//! Tile-map document shapes (a Tiled-style JSON export) and the fixed set
//! of object-layer names that contribute blocking geometry (spec §4.A).

use serde::Deserialize;
use serde_json::Value;

/// Strips the three high flip-bits Tiled sets on a GID, leaving the tile id.
pub const GID_MASK: u32 = 0x1FFF_FFFF;

pub const BLOCKING_OBJECT_LAYERS: &[&str] = &[
    "Wall",
    "Objects",
    "ObjectsOnCollide",
    "GenericObjects",
    "GenericObjectsOnCollide",
    "Computer",
    "Whiteboard",
    "VendingMachine",
    "Chair",
];

#[derive(Debug, Clone, Deserialize)]
pub struct TileMap {
    pub width: usize,
    pub height: usize,
    #[serde(rename = "tilewidth")]
    pub tile_width: usize,
    #[serde(rename = "tileheight")]
    pub tile_height: usize,
    #[serde(default)]
    pub tilesets: Vec<TilesetDef>,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TilesetDef {
    pub firstgid: u32,
    #[serde(default)]
    pub tiles: Vec<TileDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileDef {
    pub id: u32,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerDef {
    #[serde(rename = "tilelayer")]
    Tile {
        name: String,
        data: Vec<u32>,
    },
    #[serde(rename = "objectgroup")]
    ObjectGroup {
        name: String,
        #[serde(default)]
        objects: Vec<MapObject>,
    },
    /// Any other Tiled layer type (image layers, groups) carries no
    /// blocking geometry and is otherwise ignored.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapObject {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub polygon: Option<Vec<PolygonPoint>>,
    #[serde(default)]
    pub ellipse: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PolygonPoint {
    pub x: f64,
    pub y: f64,
}

impl TileMap {
    /// The set of absolute GIDs whose per-tile properties mark them as
    /// `{name:"collides", value:true}` (spec §4.A).
    pub fn blocking_gids(&self) -> std::collections::HashSet<u32> {
        let mut set = std::collections::HashSet::new();
        for tileset in &self.tilesets {
            for tile in &tileset.tiles {
                let collides = tile
                    .properties
                    .iter()
                    .any(|p| p.name == "collides" && p.value.as_bool() == Some(true));
                if collides {
                    set.insert(tileset.firstgid + tile.id);
                }
            }
        }
        set
    }
}
