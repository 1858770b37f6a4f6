use crate::constants::REGION_TAG_PREFIX;
use crate::types::Instance;

/// Applies a cached instance to an item's tag list and hostname in place.
///
/// A negative cache hit (`None`) leaves both untouched. Otherwise the
/// hostname is overwritten with the instance id and the tag list is
/// extended with `region:<region>` followed by the instance tags, in
/// order. The core never enriches the same item twice.
pub fn apply_instance(tags: &mut Vec<String>, hostname: &mut String, instance: Option<&Instance>) {
    let Some(instance) = instance else {
        return;
    };
    *hostname = instance.id.clone();
    tags.push(format!("{REGION_TAG_PREFIX}{}", instance.region));
    tags.extend(instance.tags.iter().cloned());
}
