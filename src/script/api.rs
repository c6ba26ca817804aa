//! Capability bindings exposed to script decoders.
//!
//! Scripts talk to the host exclusively through these functions; there is no
//! other channel. All bindings close over one shared [`ScriptIo`] cell owned
//! by the script decoder, so state survives between entry point calls within
//! a single load.

use super::memory::MemoryArena;
use crate::decoder::RawBuffer;
use crate::tile::{TileConfig, TileNav, TileStyle, ViewState};
use rhai::{Blob, Dynamic, Engine, Map};
use std::cell::RefCell;
use std::rc::Rc;

/// State shared between the host and the script bindings.
#[derive(Debug, Default)]
pub struct ScriptIo {
    /// View state the script may read and edit through the API.
    pub view: ViewState,
    /// Raw input bytes, bound by the pre stage.
    pub raw: RawBuffer,
    /// Scratch allocator.
    pub arena: MemoryArena,
    /// Accumulated `log(..)` output, drained by the host after each stage.
    pub message: String,
}

pub type SharedIo = Rc<RefCell<ScriptIo>>;

fn append_log(io: &SharedIo, text: &str) {
    tracing::debug!(target: "script", "{text}");
    let mut io = io.borrow_mut();
    if !io.message.is_empty() {
        io.message.push('\n');
    }
    io.message.push_str(text);
}

fn map_int(map: &Map, key: &str) -> Option<i64> {
    map.get(key).and_then(|v| v.as_int().ok())
}

fn map_bool(map: &Map, key: &str) -> Option<bool> {
    map.get(key).and_then(|v| v.as_bool().ok())
}

fn cfg_to_map(cfg: &TileConfig) -> Map {
    let mut map = Map::new();
    map.insert("start".into(), Dynamic::from(cfg.start as i64));
    map.insert("size".into(), Dynamic::from(cfg.size as i64));
    map.insert("nrow".into(), Dynamic::from(cfg.nrow as i64));
    map.insert("w".into(), Dynamic::from(cfg.fmt.w as i64));
    map.insert("h".into(), Dynamic::from(cfg.fmt.h as i64));
    map.insert("bpp".into(), Dynamic::from(cfg.fmt.bpp as i64));
    map.insert("nbytes".into(), Dynamic::from(cfg.fmt.nbytes as i64));
    map
}

fn cfg_from_map(cfg: &mut TileConfig, map: &Map) {
    if let Some(v) = map_int(map, "start") {
        cfg.start = v.max(0) as u32;
    }
    if let Some(v) = map_int(map, "size") {
        cfg.size = v.max(0) as u32;
    }
    if let Some(v) = map_int(map, "nrow") {
        cfg.nrow = v.clamp(0, u16::MAX as i64) as u16;
    }
    if let Some(v) = map_int(map, "w") {
        cfg.fmt.w = v.max(0) as u32;
    }
    if let Some(v) = map_int(map, "h") {
        cfg.fmt.h = v.max(0) as u32;
    }
    if let Some(v) = map_int(map, "bpp") {
        cfg.fmt.bpp = v.clamp(0, u8::MAX as i64) as u8;
    }
    if let Some(v) = map_int(map, "nbytes") {
        cfg.fmt.nbytes = v.max(0) as u32;
    }
}

fn nav_to_map(nav: &TileNav) -> Map {
    let mut map = Map::new();
    map.insert("index".into(), Dynamic::from(nav.index as i64));
    map.insert("offset".into(), Dynamic::from(nav.offset as i64));
    map.insert("x".into(), Dynamic::from(nav.x as i64));
    map.insert("y".into(), Dynamic::from(nav.y as i64));
    map.insert("scroll_to".into(), Dynamic::from(nav.scroll_to));
    map
}

fn nav_from_map(nav: &mut TileNav, map: &Map) {
    if let Some(v) = map_int(map, "index") {
        nav.index = v as i32;
    }
    if let Some(v) = map_int(map, "offset") {
        nav.offset = v as i32;
    }
    if let Some(v) = map_int(map, "x") {
        nav.x = v as i32;
    }
    if let Some(v) = map_int(map, "y") {
        nav.y = v as i32;
    }
    if let Some(v) = map_bool(map, "scroll_to") {
        nav.scroll_to = v;
    }
}

fn style_to_map(style: &TileStyle) -> Map {
    let mut map = Map::new();
    map.insert("scale".into(), Dynamic::from(style.scale as f64));
    map.insert("style".into(), Dynamic::from(style.style));
    map.insert("reset_scale".into(), Dynamic::from(style.reset_scale));
    map
}

fn style_from_map(style: &mut TileStyle, map: &Map) {
    if let Some(v) = map.get("scale").and_then(|v| v.as_float().ok()) {
        style.scale = v as f32;
    }
    if let Some(v) = map_int(map, "style") {
        style.style = v;
    }
    if let Some(v) = map_bool(map, "reset_scale") {
        style.reset_scale = v;
    }
}

/// Install every binding on the engine, closing over `io`.
pub fn register(engine: &mut Engine, io: &SharedIo) {
    // Logging; one to three values, stringified and joined.
    {
        let io = io.clone();
        engine.register_fn("log", move |a: Dynamic| {
            append_log(&io, &a.to_string());
        });
    }
    {
        let io = io.clone();
        engine.register_fn("log", move |a: Dynamic, b: Dynamic| {
            append_log(&io, &format!("{a} {b}"));
        });
    }
    {
        let io = io.clone();
        engine.register_fn("log", move |a: Dynamic, b: Dynamic, c: Dynamic| {
            append_log(&io, &format!("{a} {b} {c}"));
        });
    }

    // View state accessors.
    {
        let io = io.clone();
        engine.register_fn("get_tilecfg", move || cfg_to_map(&io.borrow().view.cfg));
    }
    {
        let io = io.clone();
        engine.register_fn("set_tilecfg", move |map: Map| {
            cfg_from_map(&mut io.borrow_mut().view.cfg, &map);
        });
    }
    {
        let io = io.clone();
        engine.register_fn("get_tilenav", move || nav_to_map(&io.borrow().view.nav));
    }
    {
        let io = io.clone();
        engine.register_fn("set_tilenav", move |map: Map| {
            nav_from_map(&mut io.borrow_mut().view.nav, &map);
        });
    }
    {
        let io = io.clone();
        engine.register_fn("get_tilestyle", move || style_to_map(&io.borrow().view.style));
    }
    {
        let io = io.clone();
        engine.register_fn("set_tilestyle", move |map: Map| {
            style_from_map(&mut io.borrow_mut().view.style, &map);
        });
    }

    // Raw data access, always clamped.
    {
        let io = io.clone();
        engine.register_fn("get_rawsize", move || io.borrow().raw.len() as i64);
    }
    {
        let io = io.clone();
        engine.register_fn("get_rawdata", move |offset: i64, size: i64| -> Blob {
            let io = io.borrow();
            let len = io.raw.len();
            if offset < 0 || size <= 0 || offset as usize >= len {
                return Blob::new();
            }
            let start = offset as usize;
            let end = len.min(start + size as usize);
            io.raw[start..end].to_vec()
        });
    }

    // Scratch allocator.
    {
        let io = io.clone();
        engine.register_fn("memnew", move |size: i64| io.borrow_mut().arena.alloc(size));
    }
    {
        let io = io.clone();
        engine.register_fn("memdel", move |handle: i64| io.borrow_mut().arena.free(handle));
    }
    {
        let io = io.clone();
        engine.register_fn("memsize", move |handle: i64| io.borrow().arena.size(handle));
    }
    {
        let io = io.clone();
        engine.register_fn("memreadi", move |handle: i64, offset: i64| -> Dynamic {
            let bytes = io.borrow().arena.read(handle, offset, 1);
            match bytes.first() {
                Some(&b) => Dynamic::from(b as i64),
                None => Dynamic::UNIT,
            }
        });
    }
    {
        let io = io.clone();
        engine.register_fn("memreads", move |handle: i64, offset: i64, count: i64| -> Blob {
            io.borrow().arena.read(handle, offset, count)
        });
    }
    {
        let io = io.clone();
        engine.register_fn("memwrite", move |handle: i64, offset: i64, data: Blob| {
            io.borrow_mut().arena.write(handle, offset, &data)
        });
    }
    {
        let io = io.clone();
        engine.register_fn("memwrite", move |handle: i64, offset: i64, data: &str| {
            io.borrow_mut().arena.write(handle, offset, data.as_bytes())
        });
    }
}
