fn main() {
    // ESP-IDF environment is only needed for device builds; host builds
    // (tests, fuzzing) compile without the `espidf` feature.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
