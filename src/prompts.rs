//! Instruction text sent to the vision and image-edit backends.

pub const AUDIT_PROMPT: &str = r#"You are an accessibility architect working to AODA (Accessibility for Ontarians with Disabilities Act) standards. Analyze this real estate photo.

First work out where the photo was taken (interior room or exterior entrance), what sits next to any barrier, and which doors, driveways and pathways must stay clear.

Then pick the single most critical accessibility barrier. Look for these first, in order:
1. Doorways narrower than 32 inches.
2. Slippery floor surfaces such as polished tile or glossy hardwood.
3. Small step-ups or thresholds of 1 to 4 inches.
4. Bathroom barriers: high tub walls, vanities without knee clearance, missing grab bars.
5. Stair handrails, only when nothing above applies.

Never suggest elevators, platform lifts or foundation work. Never place a ramp across a driveway, sidewalk or neighbouring door. Handrails must be open rails, never fences or enclosures. Prefer the simplest fix that removes the barrier.

Return one strict JSON object with exactly these keys:
- barrier_detected: string, the barrier and its exact location in the photo
- renovation_suggestion: string, the specific fix
- estimated_cost_usd: integer, a conservative estimate in US dollars
- compliance_note: string, citing the AODA requirement the fix satisfies (clear widths, ramp slope, grab bar heights)
- clear_mask: string, for fixes that need something removed first: the object to remove and where it is; otherwise ""
- clear_prompt: string, for removals: what the freed space should look like once the object is gone; otherwise ""
- build_mask: string, the area where the new feature goes plus the floor or wall space around it on both sides
- build_prompt: string, the new feature, safety elements (railings, grab bars) named first, with materials, sizes and positions
- mask_prompt: string, same as build_mask for removals, otherwise the area to modify
- image_gen_prompt: string, same as build_prompt for removals, otherwise the full description of the addition"#;

const AODA_DIMENSIONS: &str = "Doorways at least 32 inches clear, ramp slope no steeper than 1:12, grab bars 33 to 36 inches above the floor, handrails 34 to 38 inches.";

/// Strength at or above which an edit is phrased as a full regeneration of the region.
const FULL_REGENERATION_STRENGTH: f32 = 0.8;

fn strength_clause(strength: f32) -> String {
    if strength >= FULL_REGENERATION_STRENGTH {
        format!(
            "Denoising strength {strength:.2}: regenerate the region completely. Nothing of the original object may remain; rebuild the background behind it from the surrounding floor, walls and lighting."
        )
    } else {
        format!(
            "Denoising strength {strength:.2}: keep the existing surfaces, textures and lighting of the region and change only what the instruction requires."
        )
    }
}

fn grow_mask_clause(grow_mask: Option<u32>) -> String {
    match grow_mask {
        Some(pixels) if pixels > 0 => format!(
            "You may extend the edit up to {pixels} pixels beyond the region so the result blends with its surroundings.\n"
        ),
        _ => String::new(),
    }
}

const PREAMBLE: &str = "You are an accessibility architect producing a photorealistic renovation of this photo.";

const SPATIAL_CHECKS: &str = "- Every driveway, pathway, door and access point nearby. These must stay unobstructed.\n\
- The floor or ground plane, wall intersections and perspective.\n\
- Lighting direction and shadows.";

const GENERATE_STEP: &str = "Return the edited photograph as an image.\n\
- Everything outside the region stays exactly as it is.\n\
- Match the existing materials, colours, shadows and camera perspective.\n\
- Keep real-world proportions; nothing may look floating or pasted on.";

/// Erase pass: remove the object named by `clear_mask` and restore the background described by `clear_prompt`.
pub fn erase_instruction(
    clear_mask: &str,
    clear_prompt: &str,
    strength: f32,
    grow_mask: Option<u32>,
) -> String {
    format!(
        "{PREAMBLE}\n\
\n\
STEP 1 - SPATIAL ANALYSIS:\n\
REGION: \"{clear_mask}\" (this object is being removed)\n\
Study what surrounds it:\n\
{SPATIAL_CHECKS}\n\
\n\
STEP 2 - REMOVAL:\n\
Remove \"{clear_mask}\" completely and fill the space with: \"{clear_prompt}\"\n\
Continue the surrounding flooring, walls and textures so no outline of the object remains.\n\
Do not add any new fixtures in this pass.\n\
{strength}\n\
{grow}\
\n\
STEP 3 - GENERATE:\n\
{GENERATE_STEP}",
        strength = strength_clause(strength),
        grow = grow_mask_clause(grow_mask),
    )
}

/// Construct pass: build `build_prompt` into the `build_mask` area of an already cleared photo.
pub fn construct_instruction(
    build_mask: &str,
    build_prompt: &str,
    strength: f32,
    grow_mask: Option<u32>,
) -> String {
    format!(
        "{PREAMBLE}\n\
\n\
STEP 1 - SPATIAL ANALYSIS:\n\
REGION: \"{build_mask}\" (the obstruction here has already been cleared)\n\
Study what surrounds it:\n\
{SPATIAL_CHECKS}\n\
\n\
STEP 2 - FEASIBILITY CHECK:\n\
- The new feature must not block any driveway, pathway or doorway.\n\
- Railings are open handrails people can pass freely, never fences, cages or enclosures.\n\
- Ramps keep 36 inches of clear space beyond each end.\n\
\n\
STEP 3 - CONSTRUCTION:\n\
In the region above, construct: \"{build_prompt}\"\n\
- {AODA_DIMENSIONS}\n\
- Safety features are clearly visible and properly mounted.\n\
{strength}\n\
{grow}\
\n\
STEP 4 - GENERATE:\n\
{GENERATE_STEP}",
        strength = strength_clause(strength),
        grow = grow_mask_clause(grow_mask),
    )
}

/// Single-pass edit: add or change `prompt` within `mask_prompt`, nothing removed first.
pub fn single_pass_instruction(
    mask_prompt: &str,
    prompt: &str,
    strength: f32,
    grow_mask: Option<u32>,
) -> String {
    format!(
        "{PREAMBLE}\n\
\n\
STEP 1 - SPATIAL ANALYSIS:\n\
REGION: \"{mask_prompt}\"\n\
Study what surrounds it:\n\
{SPATIAL_CHECKS}\n\
- Wall surfaces available for mounting safety features.\n\
\n\
STEP 2 - FEASIBILITY CHECK:\n\
- The addition must not block any pathway, doorway or access point.\n\
- Grab bars and handrails are wall-mounted and open, never forming a barrier.\n\
\n\
STEP 3 - AODA COMPLIANCE:\n\
For the region above, implement: \"{prompt}\"\n\
- {AODA_DIMENSIONS}\n\
{strength}\n\
{grow}\
\n\
STEP 4 - GENERATE:\n\
{GENERATE_STEP}",
        strength = strength_clause(strength),
        grow = grow_mask_clause(grow_mask),
    )
}
