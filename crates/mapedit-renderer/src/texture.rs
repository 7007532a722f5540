//! Texture Resolver
//!
//! Resolves every miptex referenced by a level to RGB pixel data. Embedded
//! textures decode straight out of the texture lump; header-only entries are
//! searched in the WAD archives the worldspawn names. Anything that cannot
//! be resolved renders as solid white instead of failing the load.
//!
//! Decoded textures live in a [`TextureStore`] and are referred to by
//! [`TexHandle`] everywhere else, so render-group keys compare by value.

use std::path::Path;

use log::{info, warn};
use rayon::prelude::*;

use mapedit_common::bspfile::{BspMap, MipTex, MIPTEX_HEADER_LEN};
use mapedit_common::wad::{TextureArchive, WadError, WadTex};

/// CPU-side RGB8 image.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB rows, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Texture {
            width,
            height,
            data,
        }
    }

    /// 1x1 solid color.
    pub fn solid(r: u8, g: u8, b: u8) -> Self {
        Texture {
            width: 1,
            height: 1,
            data: vec![r, g, b],
        }
    }
}

/// Index into a [`TextureStore`]. Handles are stable for the life of the
/// store and compare/hash by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexHandle(pub u32);

/// Owns every decoded texture: the built-in solid colors, the map textures,
/// and the lightmap atlas pages appended later.
#[derive(Debug)]
pub struct TextureStore {
    textures: Vec<Texture>,
}

impl TextureStore {
    pub const WHITE: TexHandle = TexHandle(0);
    pub const GREY: TexHandle = TexHandle(1);
    pub const RED: TexHandle = TexHandle(2);
    pub const YELLOW: TexHandle = TexHandle(3);
    pub const BLACK: TexHandle = TexHandle(4);

    pub fn new() -> Self {
        TextureStore {
            textures: vec![
                Texture::solid(255, 255, 255),
                Texture::solid(64, 64, 64),
                Texture::solid(110, 0, 0),
                Texture::solid(255, 255, 0),
                Texture::solid(0, 0, 0),
            ],
        }
    }

    pub fn add(&mut self, tex: Texture) -> TexHandle {
        let handle = TexHandle(self.textures.len() as u32);
        self.textures.push(tex);
        handle
    }

    pub fn get(&self, handle: TexHandle) -> &Texture {
        &self.textures[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TexHandle, &Texture)> {
        self.textures
            .iter()
            .enumerate()
            .map(|(i, t)| (TexHandle(i as u32), t))
    }
}

impl Default for TextureStore {
    fn default() -> Self {
        TextureStore::new()
    }
}

/// Opens a texture archive at a path. Supplied by the embedding editor so
/// WAD parsing stays outside this crate.
pub type ArchiveOpener<'a> = dyn Fn(&Path) -> Result<Box<dyn TextureArchive>, WadError> + 'a;

/// Game directory variants searched, in order, for each archive name.
pub const GAME_DIR_VARIANTS: [&str; 4] = [
    "svencoop",
    "svencoop_addon",
    "svencoop_downloads",
    "svencoop_hd",
];

/// Archive file names from the worldspawn "wad" key: split on ';', stripped
/// to the file name so compile-machine paths do not leak into the search.
pub fn worldspawn_wad_names(map: &BspMap) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(world) = map.worldspawn() {
        for entry in world.keyvalue("wad").split(';') {
            let base = basename(entry);
            if !base.is_empty() {
                names.push(base.to_string());
            }
        }
    }
    names
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or("").trim()
}

/// Open every archive the worldspawn references. Missing or unreadable
/// archives are logged and skipped; their textures fall back to white.
pub fn open_archives(
    map: &BspMap,
    game_path: &Path,
    opener: &ArchiveOpener,
) -> Vec<Box<dyn TextureArchive>> {
    let mut archives = Vec::new();

    for name in worldspawn_wad_names(map) {
        let path = GAME_DIR_VARIANTS
            .iter()
            .map(|dir| game_path.join(dir).join(&name))
            .find(|p| p.is_file());

        let Some(path) = path else {
            warn!("missing WAD: {}", name);
            continue;
        };

        info!("loading WAD {}", path.display());
        match opener(&path) {
            Ok(archive) => archives.push(archive),
            Err(err) => warn!("failed to open WAD {}: {}", path.display(), err),
        }
    }

    archives
}

/// Indexed pixels plus their palette, pulled out of a miptex or archive
/// record but not yet expanded to RGB.
struct IndexedTex {
    width: u32,
    height: u32,
    indices: Vec<u8>,
    palette: Vec<u8>,
}

const PALETTE_LEN: usize = 256 * 3;

/// The palette sits after the smallest mip level plus a 2-byte color count.
fn embedded_indexed(tex: &MipTex) -> Option<IndexedTex> {
    let src_ofs = tex.offsets[0] as usize;
    let pal_ofs = (tex.offsets[3] as usize) + tex.last_mip_len() + 2;
    let count = (tex.width * tex.height) as usize;

    Some(IndexedTex {
        width: tex.width,
        height: tex.height,
        indices: tex.data.get(src_ofs..src_ofs + count)?.to_vec(),
        palette: tex.data.get(pal_ofs..pal_ofs + PALETTE_LEN)?.to_vec(),
    })
}

/// Archive records keep header-relative offsets but store pixel data starting
/// after the header, so the header length drops out of the offset.
fn archive_indexed(wad_tex: &WadTex) -> Option<IndexedTex> {
    let last_mip_len = ((wad_tex.width / 8) * (wad_tex.height / 8)) as usize;
    let pal_ofs =
        (wad_tex.offsets[3] as usize + last_mip_len + 2).checked_sub(MIPTEX_HEADER_LEN)?;
    let count = (wad_tex.width * wad_tex.height) as usize;

    Some(IndexedTex {
        width: wad_tex.width,
        height: wad_tex.height,
        indices: wad_tex.data.get(..count)?.to_vec(),
        palette: wad_tex.data.get(pal_ofs..pal_ofs + PALETTE_LEN)?.to_vec(),
    })
}

fn expand_indexed(tex: IndexedTex) -> Texture {
    let mut data = Vec::with_capacity(tex.indices.len() * 3);
    for &idx in &tex.indices {
        let p = idx as usize * 3;
        data.extend_from_slice(&tex.palette[p..p + 3]);
    }
    Texture::new(tex.width, tex.height, data)
}

/// Decode every miptex of the level into the store. Returns one handle per
/// miptex, in lump order. Palette expansion fans out across a thread pool;
/// everything observable is in lump order and deterministic.
pub fn load_map_textures(
    map: &BspMap,
    archives: &[Box<dyn TextureArchive>],
    store: &mut TextureStore,
) -> Vec<TexHandle> {
    let indexed: Vec<Option<IndexedTex>> = map
        .textures
        .iter()
        .map(|tex| {
            if tex.is_embedded() {
                return embedded_indexed(tex);
            }
            let archive = archives.iter().find(|a| a.has_texture(&tex.name))?;
            match archive.read_texture(&tex.name) {
                Ok(wad_tex) => archive_indexed(&wad_tex),
                Err(err) => {
                    warn!("failed to read texture {}: {}", tex.name, err);
                    None
                }
            }
        })
        .collect();

    let expanded: Vec<Option<Texture>> = indexed
        .into_par_iter()
        .map(|tex| tex.map(expand_indexed))
        .collect();

    expanded
        .into_iter()
        .enumerate()
        .map(|(i, tex)| match tex {
            Some(tex) => store.add(tex),
            None => {
                warn!("no pixel data for texture {}", map.textures[i].name);
                TextureStore::WHITE
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapedit_common::bspfile::MIP_LEVELS;
    use mapedit_common::entity::Entity;

    // 2x2 texture, palette entry n = (n, n+1, n+2)
    fn test_palette() -> Vec<u8> {
        let mut pal = Vec::with_capacity(PALETTE_LEN);
        for n in 0..256usize {
            pal.push(n as u8);
            pal.push((n + 1) as u8);
            pal.push((n + 2) as u8);
        }
        pal
    }

    fn embedded_miptex() -> MipTex {
        // layout: 40-byte header, 4 index bytes, 2-byte count, 768-byte palette
        let mut data = vec![0u8; MIPTEX_HEADER_LEN];
        data.extend_from_slice(&[0, 1, 2, 3]);
        data.extend_from_slice(&[0, 1]);
        data.extend_from_slice(&test_palette());

        MipTex {
            name: "crate64".into(),
            width: 2,
            height: 2,
            // 2x2 has an empty eighth mip, so the palette count begins at
            // offsets[3] directly
            offsets: [40, 0, 0, 44],
            data,
        }
    }

    struct MemArchive {
        tex: WadTex,
    }

    impl TextureArchive for MemArchive {
        fn has_texture(&self, name: &str) -> bool {
            self.tex.name == name
        }

        fn read_texture(&self, name: &str) -> Result<WadTex, WadError> {
            if self.has_texture(name) {
                Ok(self.tex.clone())
            } else {
                Err(WadError::NoSuchTexture(name.to_string()))
            }
        }
    }

    fn wad_archive(name: &str) -> MemArchive {
        // data excludes the header; offsets stay header-relative
        let mut data = vec![0u8; 4];
        data[0] = 3;
        data[1] = 2;
        data[2] = 1;
        data[3] = 0;
        data.extend_from_slice(&[0, 1]);
        data.extend_from_slice(&test_palette());

        MemArchive {
            tex: WadTex {
                name: name.to_string(),
                width: 2,
                height: 2,
                offsets: [40, 0, 0, 44],
                data,
            },
        }
    }

    #[test]
    fn test_builtin_handles() {
        let store = TextureStore::new();
        assert_eq!(store.get(TextureStore::WHITE).data, [255, 255, 255]);
        assert_eq!(store.get(TextureStore::GREY).data, [64, 64, 64]);
        assert_eq!(store.get(TextureStore::RED).data, [110, 0, 0]);
        assert_eq!(store.get(TextureStore::YELLOW).data, [255, 255, 0]);
        assert_eq!(store.get(TextureStore::BLACK).data, [0, 0, 0]);
    }

    #[test]
    fn test_embedded_palette_expansion() {
        let map = BspMap {
            textures: vec![embedded_miptex()],
            ..Default::default()
        };
        let mut store = TextureStore::new();
        let handles = load_map_textures(&map, &[], &mut store);

        assert_eq!(handles.len(), 1);
        let tex = store.get(handles[0]);
        assert_eq!((tex.width, tex.height), (2, 2));
        assert_eq!(
            tex.data,
            [0, 1, 2, 1, 2, 3, 2, 3, 4, 3, 4, 5],
        );
    }

    #[test]
    fn test_archive_lookup_and_fallback() {
        let missing = MipTex {
            name: "not_there".into(),
            width: 2,
            height: 2,
            offsets: [0; MIP_LEVELS],
            ..Default::default()
        };

        let in_wad = MipTex {
            name: "bricks".into(),
            width: 2,
            height: 2,
            offsets: [0; MIP_LEVELS],
            ..Default::default()
        };

        let map = BspMap {
            textures: vec![missing, in_wad],
            ..Default::default()
        };
        let archives: Vec<Box<dyn TextureArchive>> = vec![Box::new(wad_archive("bricks"))];

        let mut store = TextureStore::new();
        let handles = load_map_textures(&map, &archives, &mut store);

        // unresolved textures collapse to the shared white handle
        assert_eq!(handles[0], TextureStore::WHITE);

        let tex = store.get(handles[1]);
        assert_eq!((tex.width, tex.height), (2, 2));
        // indices 3,2,1,0 through the identity-ish palette
        assert_eq!(
            tex.data,
            [3, 4, 5, 2, 3, 4, 1, 2, 3, 0, 1, 2],
        );
    }

    #[test]
    fn test_worldspawn_wad_names() {
        let mut world = Entity::new("worldspawn");
        world.set_keyvalue(
            "wad",
            "\\sierra\\half-life\\valve\\halflife.wad;/mnt/maps/decals.wad;plain.wad;",
        );
        let map = BspMap {
            ents: vec![world],
            ..Default::default()
        };

        assert_eq!(
            worldspawn_wad_names(&map),
            ["halflife.wad", "decals.wad", "plain.wad"]
        );
    }
}
