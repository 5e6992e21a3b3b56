fn main() {
    flowsom_pipeline::cli::run();
}
