// ABOUTME: Compile-fail test verifying TargetGroupId and RuleId are not interchangeable.
// ABOUTME: This test should fail to compile, validating type safety.

use switchyard::types::{RuleId, TargetGroupId};

fn takes_target_group(_id: TargetGroupId) {}

fn main() {
    let rule = RuleId::new("apache-production-rule");
    takes_target_group(rule); // ERROR: expected TargetGroupId, found RuleId
}
