use sheet_inspect::detect;
use sheet_inspect::InspectionParams;

#[cfg(feature = "tracing")]
use sheet_inspect::core::init_tracing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    init_tracing(false);
    #[cfg(not(feature = "tracing"))]
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [template, roi, image, ..] = args.as_slice() else {
        eprintln!("Usage: inspect_pair <template> <roi_mask> <image> [config.json]");
        return Ok(());
    };

    let (params, warnings) = match args.get(3) {
        Some(cfg) => InspectionParams::load_json(cfg)?,
        None => (InspectionParams::default(), Vec::new()),
    };
    for w in &warnings {
        eprintln!("config: {w}");
    }

    let inspector = detect::inspector_from_files(template, roi, params)?;
    let result = inspector.inspect(&detect::load_rgb(image)?)?;
    println!(
        "{} defect(s), registration: {:?}",
        result.defect_count(),
        result.registration
    );
    for d in &result.defects {
        println!(
            "  ({:.1}, {:.1}) r={:.1} area={} cue={:?}",
            d.center.x, d.center.y, d.radius, d.area, d.cue
        );
    }
    Ok(())
}
