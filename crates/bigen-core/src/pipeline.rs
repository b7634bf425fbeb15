//! Compilation pipeline.
//!
//! Merge → Filter → Normalize → Prune → Strings/Index → (ROM) Lightfuncs →
//! Freeze → Encode → Render.
//!
//! Both the RAM and the ROM metadata are always prepared so that
//! inconsistencies surface regardless of which variants are enabled; only
//! the enabled variants are encoded and rendered.

use crate::builtins::Builtins;
use crate::cgen::{render_header, render_source, RenderInput};
use crate::config::{ActiveConfig, BuildMode, CompileOptions, CompilerContext, UsedDefines};
use crate::dump::dump_builtins;
use crate::error::BuiltinsResult;
use crate::filter::filter;
use crate::index::order_bidx;
use crate::lightfunc::convert_lightfuncs;
use crate::merge::merge;
use crate::metadata::MetadataDocument;
use crate::metajson::BuildMetadata;
use crate::normalize::normalize;
use crate::prune::Pruner;
use crate::ram::encode_ram;
use crate::rom::RomImage;
use crate::strings::StringTable;
use tracing::{debug, info};

/// Rendered outputs of one compilation. Nothing is written to disk here.
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs {
    pub source: String,
    pub header: String,
    pub metadata_json: String,
    pub ram_dump: String,
    pub rom_dump: String,
}

/// Run the whole pipeline over the base document and overrides.
pub fn compile(
    base: &MetadataDocument,
    overrides: &[MetadataDocument],
    active: &ActiveConfig,
    used_defines: &UsedDefines,
    options: &CompileOptions,
) -> BuiltinsResult<Outputs> {
    let merged = merge(base, overrides)?;
    info!("Merged {} override documents", overrides.len());

    let ram_ctx = CompilerContext::new(BuildMode::Ram, options, active, used_defines);
    let rom_ctx = CompilerContext::new(BuildMode::Rom, options, active, used_defines);
    let ram = prepare(&merged, &ram_ctx)?;
    let rom = prepare(&merged, &rom_ctx)?;

    let ram_data = if options.ram_support {
        Some(encode_ram(&ram)?)
    } else {
        None
    };
    let rom_image = if options.rom_support {
        Some(RomImage::build(&rom)?)
    } else {
        None
    };

    let input = RenderInput {
        info: &options.build_info,
        prefix: &options.define_prefix,
        ram: ram_data.as_ref().map(|d| (&ram, d)),
        rom: rom_image.as_ref().map(|i| (&rom, i)),
    };
    let source = render_source(&input)?;
    let header = render_header(&input);
    let metadata_json = BuildMetadata::new(&options.build_info, &ram.strings).to_json()?;

    Ok(Outputs {
        source,
        header,
        metadata_json,
        ram_dump: dump_builtins(&ram)?,
        rom_dump: dump_builtins(&rom)?,
    })
}

/// Prepare frozen builtins for one build mode from a merged document.
pub fn prepare(merged: &MetadataDocument, ctx: &CompilerContext) -> BuiltinsResult<Builtins> {
    info!("Preparing {} metadata", ctx.mode.name());
    let mut filtered = merged.clone();
    let stats = filter(&mut filtered, &ctx.active);
    debug!("Filter: {:?}", stats);

    let mut metadata = normalize(&filtered, ctx)?;

    let pruner = Pruner::new();
    pruner.prune(&mut metadata);

    let strings = StringTable::build(
        &metadata.strings,
        &metadata.special_define_names,
        &metadata.reserved_word_token_order,
        ctx,
    )?;
    order_bidx(&mut metadata);

    if ctx.is_rom() && ctx.rom_auto_lightfunc {
        let stats = convert_lightfuncs(&mut metadata);
        info!(
            "Converted {} function properties to lightfuncs, {} skipped",
            stats.converted, stats.skipped
        );
        // Converted functions may have been the last reference to an object
        pruner.prune(&mut metadata);
    }

    Builtins::freeze(&metadata, strings, ctx)
}
